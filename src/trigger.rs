//! Six-field time trigger (`second minute hour * * *`) and the single-shot
//! timer that fires it.
//!
//! The expression is daily-recurring by shape, but the send instant is always
//! chosen in the future and the process exits after the first fire, so an
//! armed trigger fires at most once.

use chrono::{DateTime, Local, TimeZone, Timelike};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("cron expression is not valid: {0:?}")]
    Invalid(String),
}

/// A parsed `second minute hour * * *` trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerExpression {
    pub second: u32,
    pub minute: u32,
    pub hour: u32,
}

impl TriggerExpression {
    /// Builds the expression from an instant's wall-clock components and
    /// validates the formatted string.
    pub fn from_instant<Tz: TimeZone>(instant: &DateTime<Tz>) -> Result<Self, TriggerError> {
        let expression = format!(
            "{} {} {} * * *",
            instant.second(),
            instant.minute(),
            instant.hour()
        );
        Self::parse(&expression)
    }

    /// Parses and validates a six-field expression.
    ///
    /// Only fixed second/minute/hour values with wildcard day, month and
    /// weekday fields are accepted.
    pub fn parse(expression: &str) -> Result<Self, TriggerError> {
        let invalid = || TriggerError::Invalid(expression.to_string());
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [second, minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(invalid());
        };
        if [day, month, weekday].iter().any(|field| **field != "*") {
            return Err(invalid());
        }

        let parse_field = |field: &str, limit: u32| -> Result<u32, TriggerError> {
            if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            field
                .parse::<u32>()
                .ok()
                .filter(|value| *value < limit)
                .ok_or_else(invalid)
        };

        Ok(Self {
            second: parse_field(*second, 60)?,
            minute: parse_field(*minute, 60)?,
            hour: parse_field(*hour, 24)?,
        })
    }
}

impl fmt::Display for TriggerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} * * *", self.second, self.minute, self.hour)
    }
}

/// An armed trigger. Dropping it does not cancel the timer; call [`stop`].
///
/// [`stop`]: ArmedTrigger::stop
pub struct ArmedTrigger {
    expression: TriggerExpression,
    fire_at: DateTime<Local>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Longest single sleep while waiting. The wall clock is re-read after each
/// one, so suspend or clock adjustments delay the fire by at most this much.
const MAX_WAIT: Duration = Duration::from_secs(30);

impl ArmedTrigger {
    /// Arms the trigger to fire once the wall clock reaches `fire_at`. A
    /// `fire_at` in the past fires right away.
    ///
    /// The action runs on its own task so that it may stop this trigger
    /// (e.g. during shutdown) without cancelling itself.
    pub fn arm_at<F, Fut>(
        expression: TriggerExpression,
        fire_at: DateTime<Local>,
        action: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                let remaining = (fire_at - Local::now()).to_std().unwrap_or_default();
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(remaining.min(MAX_WAIT)).await;
            }
            tracing::debug!("trigger fired");
            tokio::spawn(action());
        });

        Self {
            expression,
            fire_at,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn expression(&self) -> TriggerExpression {
        self.expression
    }

    pub fn fire_at(&self) -> &DateTime<Local> {
        &self.fire_at
    }

    /// Cancels the timer if it has not fired yet. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    /// True once the timer was stopped or has handed off its action.
    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        match self.handle.lock() {
            Ok(guard) => guard.as_ref().map_or(true, |handle| handle.is_finished()),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
#[path = "tests/trigger_tests.rs"]
mod tests;
