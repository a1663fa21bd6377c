//! Graceful shutdown shared by the completed-dispatch, error and interrupt
//! paths.
//!
//! Steps: stop the trigger, stop the inbound stream, log out. Each step is
//! skipped when its resource was never created, and only the first call runs.
//! A handle that logged in but never became a session is still logged out.

use crate::logging::console;
use crate::platform::{PlatformError, PlatformSession};
use crate::session::Session;
use crate::structured_logger::{RunEvent, StructuredLogger};
use crate::trigger::ArmedTrigger;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    MessageSent,
    UserExit,
    Error,
    Interrupted,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ShutdownReason::MessageSent => "message_sent",
            ShutdownReason::UserExit => "user_exit",
            ShutdownReason::Error => "error",
            ShutdownReason::Interrupted => "interrupted",
        };
        f.write_str(reason)
    }
}

pub struct Shutdown {
    done: AtomicBool,
    trigger: Mutex<Option<Arc<ArmedTrigger>>>,
    session: Mutex<Option<Arc<Session>>>,
    pending_handle: Mutex<Option<Arc<dyn PlatformSession>>>,
    logger: Arc<StructuredLogger>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shutdown {
    pub fn new(logger: Arc<StructuredLogger>) -> Self {
        Self {
            done: AtomicBool::new(false),
            trigger: Mutex::new(None),
            session: Mutex::new(None),
            pending_handle: Mutex::new(None),
            logger,
        }
    }

    /// Takes over from any pending handle.
    pub fn set_session(&self, session: Arc<Session>) {
        *lock(&self.session) = Some(session);
        lock(&self.pending_handle).take();
    }

    pub fn set_pending_handle(&self, handle: Arc<dyn PlatformSession>) {
        *lock(&self.pending_handle) = Some(handle);
    }

    pub fn clear_pending_handle(&self) {
        lock(&self.pending_handle).take();
    }

    pub fn set_trigger(&self, trigger: Arc<ArmedTrigger>) {
        *lock(&self.trigger) = Some(trigger);
    }

    #[cfg(test)]
    pub fn has_run(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Runs the shutdown steps. Returns false if shutdown already ran.
    pub async fn run(&self, reason: ShutdownReason) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::debug!(%reason, "shutting down");

        let trigger = lock(&self.trigger).take();
        if let Some(trigger) = trigger {
            tracing::debug!(
                expression = %trigger.expression(),
                fire_at = %trigger.fire_at(),
                "stopping trigger"
            );
            trigger.stop();
        }

        let session = lock(&self.session).take();
        let pending = lock(&self.pending_handle).take();
        let logout = match (session, pending) {
            (Some(session), _) => Some(session.close().await),
            (None, Some(handle)) => Some(close_pending(handle.as_ref()).await),
            (None, None) => None,
        };
        match logout {
            Some(Ok(())) => console::info("Logged out."),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "logout failed");
                console::caution(&format!("Logout failed: {}", e));
            }
            None => {}
        }

        console::info("Exited auto-messenger.");
        self.logger.record(RunEvent::Shutdown {
            reason: reason.to_string(),
        });
        true
    }
}

async fn close_pending(handle: &dyn PlatformSession) -> Result<(), PlatformError> {
    if let Err(e) = handle.stop_listening().await {
        tracing::debug!(error = %e, "stop listening failed");
    }
    handle.logout().await
}

#[cfg(test)]
#[path = "tests/shutdown_tests.rs"]
mod tests;
