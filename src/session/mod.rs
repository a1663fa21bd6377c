//! Session establishment.
//!
//! Login tries the persisted session first and falls back to an interactive
//! credential loop. Platform failures are classified into bad credentials
//! (retry), step-up verification (one-time force-login opt-in) and anything
//! else (fatal). The resulting session is listening before it is returned.

pub mod app_state;

use crate::context::AppContext;
use crate::decisions::DecisionProvider;
use crate::logging::{console, palette};
use crate::platform::{
    Credentials, LoginOptions, LoginRequest, MessengerPlatform, PlatformError, PlatformSession,
};
use crate::shutdown::Shutdown;
use crate::stream::{InboundStream, Subscription};
use crate::structured_logger::{RunEvent, StructuredLogger};
use anyhow::{anyhow, bail, Result};
use app_state::AppStateStore;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Substring the platform client puts in its error when the login was held
/// for identity verification (2FA or an unrecognised location).
pub const STEP_UP_MARKER: &str = "Error retrieving userID";

/// Termination chosen by the user rather than caused by a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct UserExit {
    pub reason: String,
}

impl UserExit {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    NoSession,
    TryPersisted,
    TryCredentials,
    Retry,
    ForceLoginPrompt,
    Fatal,
    Active,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::NoSession => "NoSession",
            LoginState::TryPersisted => "TryPersisted",
            LoginState::TryCredentials => "TryCredentials",
            LoginState::Retry => "Retry",
            LoginState::ForceLoginPrompt => "ForceLoginPrompt",
            LoginState::Fatal => "Fatal",
            LoginState::Active => "Active",
        };
        f.write_str(name)
    }
}

/// How a failed login attempt is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    BadCredentials,
    StepUpVerification,
    Other(String),
}

pub fn classify_login_error(error: &PlatformError) -> LoginFailure {
    match error {
        PlatformError::Rejected(_) => LoginFailure::BadCredentials,
        PlatformError::Failure(message) if message.contains(STEP_UP_MARKER) => {
            LoginFailure::StepUpVerification
        }
        other => LoginFailure::Other(other.to_string()),
    }
}

/// An authenticated, listening session.
pub struct Session {
    handle: Arc<dyn PlatformSession>,
    stream: InboundStream,
    error_log: Subscription,
    closed: AtomicBool,
}

impl Session {
    pub fn handle(&self) -> Arc<dyn PlatformSession> {
        self.handle.clone()
    }

    pub fn stream(&self) -> &InboundStream {
        &self.stream
    }

    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.handle.is_active()
    }

    /// Stops listening and logs out. Only the first call does anything.
    pub async fn close(&self) -> Result<(), PlatformError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.error_log.unsubscribe();
        let stopped = self.handle.stop_listening().await;
        self.stream.close();
        if let Err(e) = &stopped {
            tracing::warn!(error = %e, "stop listening failed");
        }
        self.handle.logout().await
    }
}

pub struct SessionManager {
    platform: Arc<dyn MessengerPlatform>,
    store: Arc<dyn AppStateStore>,
    logger: Arc<StructuredLogger>,
    state: LoginState,
    transitions: Vec<LoginState>,
    initial_email: Option<String>,
    shutdown: Option<Arc<Shutdown>>,
}

impl SessionManager {
    pub fn new(
        platform: Arc<dyn MessengerPlatform>,
        store: Arc<dyn AppStateStore>,
        logger: Arc<StructuredLogger>,
    ) -> Self {
        Self {
            platform,
            store,
            logger,
            state: LoginState::NoSession,
            transitions: vec![LoginState::NoSession],
            initial_email: None,
            shutdown: None,
        }
    }

    /// Lets `shutdown` log out a handle that is logged in but not yet
    /// returned as a [`Session`].
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Every state entered so far, starting with `NoSession`.
    #[cfg(test)]
    pub fn transitions(&self) -> &[LoginState] {
        &self.transitions
    }

    /// Logs in, starts the inbound stream and registers the error logger.
    ///
    /// Returns [`UserExit`] (wrapped in the anyhow error) when the user
    /// declines to continue after a step-up verification failure.
    pub async fn establish_session(
        &mut self,
        context: &mut AppContext,
        decisions: &dyn DecisionProvider,
    ) -> Result<Session> {
        let handle = match self.try_persisted(context).await {
            Some(handle) => handle,
            None => self.credential_loop(context, decisions).await?,
        };
        if let Some(shutdown) = &self.shutdown {
            shutdown.set_pending_handle(handle.clone());
        }

        let receiver = match handle.listen().await {
            Ok(receiver) => receiver,
            Err(e) => {
                self.abandon(handle.as_ref()).await;
                return Err(anyhow!(e).context("Unable to establish connection."));
            }
        };
        if !handle.is_active() {
            self.abandon(handle.as_ref()).await;
            bail!("Unable to establish connection.");
        }

        let stream = InboundStream::start(receiver);
        let error_log = stream.subscribe_error_log();
        self.transition(LoginState::Active);

        match context.email() {
            Some(email) => console::line(format!("Logged in as {}", palette::success(email))),
            None => console::line(palette::success("Logged in.")),
        }
        console::blank();

        Ok(Session {
            handle,
            stream,
            error_log,
            closed: AtomicBool::new(false),
        })
    }

    /// Never fails: any problem with the persisted session falls through to
    /// credential login.
    async fn try_persisted(&mut self, context: &AppContext) -> Option<Arc<dyn PlatformSession>> {
        self.transition(LoginState::TryPersisted);

        let state = match self.store.load() {
            Ok(Some(state)) => state,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring persisted session");
                console::caution("Failed to read saved login session. Trying email/password login.");
                return None;
            }
        };

        console::info("Found saved login session. Logging in...");
        let options = LoginOptions {
            force_login: context.force_login(),
        };
        match self
            .platform
            .login(LoginRequest::AppState(state), options)
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::debug!(error = %e, "persisted session rejected");
                console::caution("Failed to login with saved session. Trying email/password login.");
                None
            }
        }
    }

    async fn credential_loop(
        &mut self,
        context: &mut AppContext,
        decisions: &dyn DecisionProvider,
    ) -> Result<Arc<dyn PlatformSession>> {
        loop {
            self.transition(LoginState::TryCredentials);
            if self.initial_email.is_none() {
                self.initial_email = context.email().map(str::to_string);
            }

            let email = match context.email() {
                Some(email) => email.to_string(),
                None => {
                    let email = decisions
                        .login_email(self.initial_email.as_deref())
                        .await?;
                    context.set_email(email.clone());
                    email
                }
            };
            let password = decisions.login_password().await?;

            console::info("Logging in...");
            let options = LoginOptions {
                force_login: context.force_login(),
            };
            let request = LoginRequest::Credentials(Credentials { email, password });

            let error = match self.platform.login(request, options).await {
                Ok(handle) => {
                    self.persist(handle.as_ref());
                    return Ok(handle);
                }
                Err(error) => error,
            };

            match classify_login_error(&error) {
                LoginFailure::BadCredentials => {
                    console::caution("Wrong email/password.");
                    context.clear_email();
                    self.transition(LoginState::Retry);
                }
                LoginFailure::StepUpVerification => {
                    self.transition(LoginState::ForceLoginPrompt);
                    if context.force_login() {
                        console::blank();
                        console::caution(
                            "Failed to login. Please check your account security/login settings and disable 2FA if needed.",
                        );
                        self.transition(LoginState::Fatal);
                        return Err(UserExit::new("Login blocked by identity verification.").into());
                    }

                    console::caution(
                        "Failed to login. You either have 2FA enabled or are logging in from an unknown location.",
                    );
                    console::blank();
                    console::info("Try again with a force login?");
                    console::caution(
                        "This will automatically approve of any recent logins and continue with the login process.",
                    );

                    if decisions.confirm_force_login().await? {
                        context.enable_force_login();
                        self.transition(LoginState::Retry);
                    } else {
                        self.transition(LoginState::Fatal);
                        return Err(UserExit::new("Force login declined.").into());
                    }
                }
                LoginFailure::Other(message) => {
                    tracing::debug!(%message, "login failed");
                    self.transition(LoginState::Fatal);
                    return Err(anyhow!(error).context("Failed to login"));
                }
            }
        }
    }

    /// Logs out a handle that never became a session.
    async fn abandon(&mut self, handle: &dyn PlatformSession) {
        self.transition(LoginState::Fatal);
        if let Some(shutdown) = &self.shutdown {
            shutdown.clear_pending_handle();
        }
        if let Err(e) = handle.stop_listening().await {
            tracing::warn!(error = %e, "stop listening failed");
        }
        if let Err(e) = handle.logout().await {
            tracing::warn!(error = %e, "logout failed");
        }
    }

    fn persist(&self, handle: &dyn PlatformSession) {
        match self.store.save(&handle.app_state()) {
            Ok(()) => {
                console::info("Saved login session.");
                self.logger.record(RunEvent::AppStateSaved {
                    path: self.store.location(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist login session");
                console::caution(&format!("Could not save login session: {:#}", e));
            }
        }
    }

    fn transition(&mut self, to: LoginState) {
        tracing::debug!(from = %self.state, to = %to, "login state");
        self.logger.record(RunEvent::LoginTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        });
        self.state = to;
        self.transitions.push(to);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
