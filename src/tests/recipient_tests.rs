use super::*;
use crate::platform::fake::{FakeCall, FakePlatform};

fn resolver(platform: &FakePlatform) -> RecipientResolver {
    RecipientResolver::new(platform.session(), Arc::new(StructuredLogger::disabled()))
}

#[tokio::test]
async fn test_thread_name_wins() {
    let platform = FakePlatform::new();
    platform
        .set_thread_name("10", Ok(Some("Book Club".to_string())))
        .set_user_name("10", Ok(Some("Nobody".to_string())));

    let name = resolver(&platform).resolve_name("10").await.unwrap();

    assert_eq!(name, "Book Club");
    assert_eq!(platform.calls(), vec![FakeCall::ThreadInfo("10".to_string())]);
}

#[tokio::test]
async fn test_falls_back_to_user_when_thread_lookup_fails() {
    let platform = FakePlatform::new();
    platform
        .set_thread_name("20", Err(PlatformError::Failure("Cannot read property".to_string())))
        .set_user_name("20", Ok(Some("Alice".to_string())));

    let name = resolver(&platform).resolve_name("20").await.unwrap();

    assert_eq!(name, "Alice");
    assert_eq!(
        platform.calls(),
        vec![
            FakeCall::ThreadInfo("20".to_string()),
            FakeCall::UserInfo("20".to_string())
        ]
    );
}

#[tokio::test]
async fn test_falls_back_to_user_when_thread_name_blank() {
    let platform = FakePlatform::new();
    platform
        .set_thread_name("30", Ok(Some("   ".to_string())))
        .set_user_name("30", Ok(Some("Bob".to_string())));

    assert_eq!(resolver(&platform).resolve_name("30").await.unwrap(), "Bob");
}

#[tokio::test]
async fn test_both_tiers_failing_is_an_error() {
    let platform = FakePlatform::new();
    platform.set_user_name("40", Err(PlatformError::Failure("not found".to_string())));

    let err = resolver(&platform).resolve_name("40").await.unwrap_err();

    assert_eq!(err.identifier, "40");
    assert!(err.to_string().starts_with("Unable to resolve recipient"));
}
