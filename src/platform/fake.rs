//! Scripted in-memory platform for tests.

use super::{
    AppState, InboundEvent, LoginOptions, LoginRequest, MessengerPlatform, OutgoingMessage,
    PlatformError, PlatformSession, ThreadInfo, UserInfo,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Calls observed by the fake, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Login {
        kind: &'static str,
        email: Option<String>,
        force_login: bool,
    },
    ThreadInfo(String),
    UserInfo(String),
    Listen,
    SendMessage(OutgoingMessage, String),
    StopListening,
    Logout,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<FakeCall>>,
    login_results: Mutex<VecDeque<Result<(), PlatformError>>>,
    app_state_logins_fail: AtomicBool,
    thread_names: Mutex<HashMap<String, Result<Option<String>, PlatformError>>>,
    user_names: Mutex<HashMap<String, Result<Option<String>, PlatformError>>>,
    inactive_after_listen: AtomicBool,
    listen_error: Mutex<Option<PlatformError>>,
    send_error: Mutex<Option<PlatformError>>,
    events: Mutex<Option<mpsc::UnboundedSender<InboundEvent>>>,
}

/// A platform whose responses are scripted up front.
#[derive(Clone, Default)]
pub struct FakePlatform {
    shared: Arc<Shared>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next credential login. Once the queue is
    /// empty, credential logins succeed.
    pub fn push_login_result(&self, result: Result<(), PlatformError>) -> &Self {
        self.shared.login_results.lock().unwrap().push_back(result);
        self
    }

    pub fn reject_app_state_logins(&self) -> &Self {
        self.shared.app_state_logins_fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_thread_name(&self, id: &str, name: Result<Option<String>, PlatformError>) -> &Self {
        self.shared
            .thread_names
            .lock()
            .unwrap()
            .insert(id.to_string(), name);
        self
    }

    pub fn set_user_name(&self, id: &str, name: Result<Option<String>, PlatformError>) -> &Self {
        self.shared
            .user_names
            .lock()
            .unwrap()
            .insert(id.to_string(), name);
        self
    }

    pub fn report_inactive_after_listen(&self) -> &Self {
        self.shared.inactive_after_listen.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_listen_with(&self, error: PlatformError) -> &Self {
        *self.shared.listen_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_sends_with(&self, error: PlatformError) -> &Self {
        *self.shared.send_error.lock().unwrap() = Some(error);
        self
    }

    /// Pushes an event onto the inbound stream. Returns false before `listen`.
    pub fn emit(&self, event: InboundEvent) -> bool {
        match self.shared.events.lock().unwrap().as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    pub fn emit_message(&self, thread_id: &str) -> bool {
        self.emit(InboundEvent::Message {
            thread_id: Some(thread_id.to_string()),
            sender_id: Some(thread_id.to_string()),
            body: Some("hi".to_string()),
        })
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&FakeCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    /// A session handle that is already logged in, for components that do
    /// not care about authentication.
    pub fn session(&self) -> Arc<dyn PlatformSession> {
        Arc::new(FakeSession {
            shared: self.shared.clone(),
            listening: AtomicBool::new(false),
        })
    }

    fn record(&self, call: FakeCall) {
        self.shared.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MessengerPlatform for FakePlatform {
    async fn login(
        &self,
        request: LoginRequest,
        options: LoginOptions,
    ) -> Result<Arc<dyn PlatformSession>, PlatformError> {
        let email = match &request {
            LoginRequest::Credentials(credentials) => Some(credentials.email.clone()),
            LoginRequest::AppState(_) => None,
        };
        self.record(FakeCall::Login {
            kind: request.kind(),
            email,
            force_login: options.force_login,
        });

        let result = match request {
            LoginRequest::AppState(_) => {
                if self.shared.app_state_logins_fail.load(Ordering::SeqCst) {
                    Err(PlatformError::Failure("Session expired".to_string()))
                } else {
                    Ok(())
                }
            }
            LoginRequest::Credentials(_) => self
                .shared
                .login_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(())),
        };

        result.map(|()| self.session())
    }
}

struct FakeSession {
    shared: Arc<Shared>,
    listening: AtomicBool,
}

impl FakeSession {
    fn record(&self, call: FakeCall) {
        self.shared.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlatformSession for FakeSession {
    fn app_state(&self) -> AppState {
        AppState(serde_json::json!([{"key": "c_user", "value": "fake"}]))
    }

    async fn thread_info(&self, thread_id: &str) -> Result<ThreadInfo, PlatformError> {
        self.record(FakeCall::ThreadInfo(thread_id.to_string()));
        let scripted = self.shared.thread_names.lock().unwrap().get(thread_id).cloned();
        scripted
            .unwrap_or(Ok(None))
            .map(|thread_name| ThreadInfo { thread_name })
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, PlatformError> {
        self.record(FakeCall::UserInfo(user_id.to_string()));
        let scripted = self.shared.user_names.lock().unwrap().get(user_id).cloned();
        scripted.unwrap_or(Ok(None)).map(|name| UserInfo { name })
    }

    async fn listen(&self) -> Result<mpsc::UnboundedReceiver<InboundEvent>, PlatformError> {
        self.record(FakeCall::Listen);
        if let Some(error) = self.shared.listen_error.lock().unwrap().clone() {
            return Err(error);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.events.lock().unwrap() = Some(tx);
        let active = !self.shared.inactive_after_listen.load(Ordering::SeqCst);
        self.listening.store(active, Ordering::SeqCst);
        Ok(rx)
    }

    fn is_active(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    async fn send_message(
        &self,
        message: &OutgoingMessage,
        thread_id: &str,
    ) -> Result<(), PlatformError> {
        self.record(FakeCall::SendMessage(message.clone(), thread_id.to_string()));
        match self.shared.send_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn stop_listening(&self) -> Result<(), PlatformError> {
        self.record(FakeCall::StopListening);
        self.listening.store(false, Ordering::SeqCst);
        self.shared.events.lock().unwrap().take();
        Ok(())
    }

    async fn logout(&self) -> Result<(), PlatformError> {
        self.record(FakeCall::Logout);
        Ok(())
    }
}
