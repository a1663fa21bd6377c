use super::*;
use crate::config::AppConfig;
use crate::decisions::scripted::ScriptedDecisions;
use crate::platform::fake::{FakeCall, FakePlatform};
use crate::platform::AppState;
use serde_json::json;
use std::sync::Mutex;

/// In-memory store counting writes.
#[derive(Default)]
struct MemoryStore {
    stored: Mutex<Option<AppState>>,
    corrupt: bool,
    saves: Mutex<usize>,
}

impl MemoryStore {
    fn with_state(state: AppState) -> Self {
        Self {
            stored: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Self::default()
        }
    }

    fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl AppStateStore for MemoryStore {
    fn load(&self) -> Result<Option<AppState>> {
        if self.corrupt {
            bail!("Failed to parse app state");
        }
        Ok(self.stored.lock().unwrap().clone())
    }

    fn save(&self, state: &AppState) -> Result<()> {
        *self.saves.lock().unwrap() += 1;
        *self.stored.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

fn manager(platform: &FakePlatform, store: Arc<MemoryStore>) -> SessionManager {
    SessionManager::new(
        Arc::new(platform.clone()),
        store,
        Arc::new(StructuredLogger::disabled()),
    )
}

fn context_with_email(email: Option<&str>) -> AppContext {
    AppContext::new(
        AppConfig {
            email: email.map(str::to_string),
            ..AppConfig::default()
        },
        email.is_some(),
    )
}

fn wrong_password() -> Result<(), PlatformError> {
    Err(PlatformError::Rejected("Wrong username/password.".to_string()))
}

fn step_up() -> Result<(), PlatformError> {
    Err(PlatformError::Failure(
        "Error retrieving userID. This can be caused by a lot of things, including getting blocked by Facebook for logging in from an unknown location.".to_string(),
    ))
}

fn count(transitions: &[LoginState], state: LoginState) -> usize {
    transitions.iter().filter(|s| **s == state).count()
}

#[test]
fn test_classification() {
    assert_eq!(
        classify_login_error(&PlatformError::Rejected("Wrong username/password.".to_string())),
        LoginFailure::BadCredentials
    );
    assert_eq!(
        classify_login_error(&PlatformError::Failure("Error retrieving userID.".to_string())),
        LoginFailure::StepUpVerification
    );
    assert!(matches!(
        classify_login_error(&PlatformError::Failure("socket hang up".to_string())),
        LoginFailure::Other(_)
    ));
    assert!(matches!(
        classify_login_error(&PlatformError::Transport("Error retrieving userID".to_string())),
        LoginFailure::Other(_)
    ));
}

#[tokio::test]
async fn test_persisted_session_skips_credentials() {
    let platform = FakePlatform::new();
    let store = Arc::new(MemoryStore::with_state(AppState(json!([{"key": "c_user"}]))));
    let mut manager = manager(&platform, store.clone());
    let decisions = ScriptedDecisions::new();
    let mut context = context_with_email(None);

    let session = manager
        .establish_session(&mut context, &decisions)
        .await
        .unwrap();

    assert!(session.is_active());
    assert_eq!(store.saves(), 0);
    assert_eq!(
        manager.transitions(),
        &[LoginState::NoSession, LoginState::TryPersisted, LoginState::Active]
    );
    assert_eq!(
        platform.calls(),
        vec![
            FakeCall::Login {
                kind: "app_state",
                email: None,
                force_login: false
            },
            FakeCall::Listen
        ]
    );
}

#[tokio::test]
async fn test_rejected_persisted_session_falls_back_silently() {
    let platform = FakePlatform::new();
    platform.reject_app_state_logins();
    let store = Arc::new(MemoryStore::with_state(AppState(json!({"stale": true}))));
    let mut manager = manager(&platform, store.clone());
    let decisions = ScriptedDecisions::new().password("secret");
    let mut context = context_with_email(Some("me@example.com"));

    manager
        .establish_session(&mut context, &decisions)
        .await
        .unwrap();

    assert_eq!(store.saves(), 1);
    assert_eq!(manager.state(), LoginState::Active);
    assert_eq!(
        platform.count(|c| matches!(c, FakeCall::Login { kind: "credentials", .. })),
        1
    );
}

#[tokio::test]
async fn test_corrupt_persisted_session_falls_back() {
    let platform = FakePlatform::new();
    let store = Arc::new(MemoryStore::corrupt());
    let mut manager = manager(&platform, store);
    let decisions = ScriptedDecisions::new().password("secret");
    let mut context = context_with_email(Some("me@example.com"));

    manager
        .establish_session(&mut context, &decisions)
        .await
        .unwrap();

    assert_eq!(
        platform.count(|c| matches!(c, FakeCall::Login { kind: "app_state", .. })),
        0
    );
}

#[tokio::test]
async fn test_three_bad_credentials_then_success() {
    let platform = FakePlatform::new();
    platform
        .push_login_result(wrong_password())
        .push_login_result(wrong_password())
        .push_login_result(wrong_password());
    let store = Arc::new(MemoryStore::default());
    let mut manager = manager(&platform, store.clone());
    let decisions = ScriptedDecisions::new()
        .email("typo@example.com")
        .email("typo2@example.com")
        .email("me@example.com")
        .passwords(4);
    let mut context = context_with_email(Some("first@example.com"));

    manager
        .establish_session(&mut context, &decisions)
        .await
        .unwrap();

    assert_eq!(store.saves(), 1);
    assert_eq!(count(manager.transitions(), LoginState::Active), 1);
    assert_eq!(count(manager.transitions(), LoginState::Retry), 3);
    assert_eq!(count(manager.transitions(), LoginState::TryCredentials), 4);
    assert_eq!(context.email(), Some("me@example.com"));

    // The email is cleared after each rejection and re-asked with the first value pre-filled
    assert_eq!(
        decisions.email_prefills(),
        vec![Some("first@example.com".to_string()); 3]
    );
    assert_eq!(decisions.remaining_passwords(), 0);
}

#[tokio::test]
async fn test_step_up_then_force_login_succeeds() {
    let platform = FakePlatform::new();
    platform.push_login_result(step_up());
    let store = Arc::new(MemoryStore::default());
    let mut manager = manager(&platform, store.clone());
    let decisions = ScriptedDecisions::new().passwords(2).force_login(true);
    let mut context = context_with_email(Some("me@example.com"));

    manager
        .establish_session(&mut context, &decisions)
        .await
        .unwrap();

    assert!(context.force_login());
    assert_eq!(
        platform.count(|c| matches!(
            c,
            FakeCall::Login {
                kind: "credentials",
                force_login: true,
                ..
            }
        )),
        1
    );
    assert_eq!(
        manager.transitions(),
        &[
            LoginState::NoSession,
            LoginState::TryPersisted,
            LoginState::TryCredentials,
            LoginState::ForceLoginPrompt,
            LoginState::Retry,
            LoginState::TryCredentials,
            LoginState::Active
        ]
    );
}

#[tokio::test]
async fn test_step_up_declined_is_user_exit() {
    let platform = FakePlatform::new();
    platform.push_login_result(step_up());
    let mut manager = manager(&platform, Arc::new(MemoryStore::default()));
    let decisions = ScriptedDecisions::new().password("secret").force_login(false);
    let mut context = context_with_email(Some("me@example.com"));

    let err = manager
        .establish_session(&mut context, &decisions)
        .await
        .err()
        .unwrap();

    assert!(err.downcast_ref::<UserExit>().is_some());
    assert_eq!(manager.state(), LoginState::Fatal);
    assert!(!context.force_login());
}

#[tokio::test]
async fn test_step_up_with_force_login_already_set_is_terminal() {
    let platform = FakePlatform::new();
    platform.push_login_result(step_up()).push_login_result(step_up());
    let mut manager = manager(&platform, Arc::new(MemoryStore::default()));
    let decisions = ScriptedDecisions::new().passwords(2).force_login(true);
    let mut context = context_with_email(Some("me@example.com"));

    let err = manager
        .establish_session(&mut context, &decisions)
        .await
        .err()
        .unwrap();

    assert!(err.downcast_ref::<UserExit>().is_some());
    assert_eq!(count(manager.transitions(), LoginState::ForceLoginPrompt), 2);
    assert_eq!(manager.state(), LoginState::Fatal);
}

#[tokio::test]
async fn test_unknown_error_is_fatal_without_retry() {
    let platform = FakePlatform::new();
    platform.push_login_result(Err(PlatformError::Transport("connection refused".to_string())));
    let store = Arc::new(MemoryStore::default());
    let mut manager = manager(&platform, store.clone());
    let decisions = ScriptedDecisions::new().passwords(3);
    let mut context = context_with_email(Some("me@example.com"));

    let err = manager
        .establish_session(&mut context, &decisions)
        .await
        .err()
        .unwrap();

    assert!(err.downcast_ref::<UserExit>().is_none());
    assert!(format!("{:#}", err).contains("connection refused"));
    assert_eq!(store.saves(), 0);
    assert_eq!(decisions.remaining_passwords(), 2);
    assert_eq!(manager.state(), LoginState::Fatal);
}

#[tokio::test]
async fn test_inactive_stream_is_fatal() {
    let platform = FakePlatform::new();
    platform.report_inactive_after_listen();
    let mut manager = manager(&platform, Arc::new(MemoryStore::default()));
    let decisions = ScriptedDecisions::new().password("secret");
    let mut context = context_with_email(Some("me@example.com"));

    let err = manager
        .establish_session(&mut context, &decisions)
        .await
        .err()
        .unwrap();

    assert!(err.to_string().contains("Unable to establish connection"));
    assert_eq!(manager.state(), LoginState::Fatal);
    assert_eq!(platform.count(|c| *c == FakeCall::StopListening), 1);
    assert_eq!(platform.count(|c| *c == FakeCall::Logout), 1);
}

#[tokio::test]
async fn test_listen_failure_logs_out_once() {
    let platform = FakePlatform::new();
    platform.fail_listen_with(PlatformError::Transport("socket closed".to_string()));
    let shutdown = Arc::new(Shutdown::new(Arc::new(StructuredLogger::disabled())));
    let mut manager =
        manager(&platform, Arc::new(MemoryStore::default())).with_shutdown(shutdown.clone());
    let decisions = ScriptedDecisions::new().password("secret");
    let mut context = context_with_email(Some("me@example.com"));

    let err = manager
        .establish_session(&mut context, &decisions)
        .await
        .err()
        .unwrap();

    assert!(format!("{:#}", err).contains("socket closed"));
    assert_eq!(manager.state(), LoginState::Fatal);
    assert_eq!(platform.count(|c| *c == FakeCall::Logout), 1);

    shutdown.run(crate::shutdown::ShutdownReason::Error).await;
    assert_eq!(platform.count(|c| *c == FakeCall::Logout), 1);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let platform = FakePlatform::new();
    let mut manager = manager(&platform, Arc::new(MemoryStore::default()));
    let decisions = ScriptedDecisions::new().password("secret");
    let mut context = context_with_email(Some("me@example.com"));
    let session = manager
        .establish_session(&mut context, &decisions)
        .await
        .unwrap();

    session.close().await.unwrap();
    session.close().await.unwrap();

    assert!(!session.is_active());
    assert_eq!(platform.count(|c| *c == FakeCall::Logout), 1);
    assert_eq!(platform.count(|c| *c == FakeCall::StopListening), 1);
}
