//! Recipient name resolution: thread metadata first, then user profile.

use crate::platform::{PlatformError, PlatformSession};
use crate::structured_logger::{RunEvent, StructuredLogger};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unable to resolve recipient name for thread ID {identifier}")]
pub struct UnresolvedRecipient {
    pub identifier: String,
}

/// Which lookup produced the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    Thread,
    User,
}

impl NameSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameSource::Thread => "thread",
            NameSource::User => "user",
        }
    }
}

#[derive(Clone)]
pub struct RecipientResolver {
    session: Arc<dyn PlatformSession>,
    logger: Arc<StructuredLogger>,
}

impl RecipientResolver {
    pub fn new(session: Arc<dyn PlatformSession>, logger: Arc<StructuredLogger>) -> Self {
        Self { session, logger }
    }

    /// Returns the display name for a thread or user identifier.
    pub async fn resolve_name(&self, identifier: &str) -> Result<String, UnresolvedRecipient> {
        let (name, source) = self.lookup(identifier).await?;
        self.logger.record(RunEvent::RecipientResolved {
            thread_id: identifier.to_string(),
            source: source.as_str().to_string(),
        });
        Ok(name)
    }

    async fn lookup(&self, identifier: &str) -> Result<(String, NameSource), UnresolvedRecipient> {
        // One-to-one threads may fail or come back unnamed here
        match self.session.thread_info(identifier).await {
            Ok(info) => {
                if let Some(name) = non_empty(info.thread_name) {
                    return Ok((name, NameSource::Thread));
                }
            }
            Err(e) => log_lookup_failure("thread", identifier, &e),
        }

        match self.session.user_info(identifier).await {
            Ok(info) => {
                if let Some(name) = non_empty(info.name) {
                    return Ok((name, NameSource::User));
                }
            }
            Err(e) => log_lookup_failure("user", identifier, &e),
        }

        Err(UnresolvedRecipient {
            identifier: identifier.to_string(),
        })
    }
}

fn non_empty(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

fn log_lookup_failure(tier: &str, identifier: &str, error: &PlatformError) {
    tracing::debug!(tier, identifier, error = %error, "recipient lookup failed");
}

#[cfg(test)]
#[path = "tests/recipient_tests.rs"]
mod tests;
