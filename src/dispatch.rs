//! Dispatch scheduling: payload construction, the immutable plan, and the
//! single trigger that sends it.

use crate::logging::{console, palette};
use crate::platform::{OutgoingMessage, PlatformError, PlatformSession};
use crate::send_time::{formatted_now, SendTime};
use crate::structured_logger::{RunEvent, StructuredLogger};
use crate::trigger::{ArmedTrigger, TriggerExpression};
use anyhow::{anyhow, bail, Result};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Message body that sends the like sticker instead of text.
pub const LIKE_STICKER_ALIAS: &str = "like";
pub const LIKE_STICKER_ID: u64 = 369_239_263_222_822;

/// Turns the configured body into a payload. Resolved once, before arming.
pub fn build_payload(body: &str) -> OutgoingMessage {
    if body == LIKE_STICKER_ALIAS {
        OutgoingMessage::Sticker {
            sticker: LIKE_STICKER_ID,
        }
    } else {
        OutgoingMessage::Text {
            body: body.to_string(),
        }
    }
}

pub fn describe_payload(payload: &OutgoingMessage) -> String {
    match payload {
        OutgoingMessage::Sticker {
            sticker: LIKE_STICKER_ID,
        } => "like/thumbs-up sticker".to_string(),
        OutgoingMessage::Sticker { sticker } => format!("sticker {}", sticker),
        OutgoingMessage::Text { body } => format!("\"{}\"", body),
    }
}

#[derive(Debug, Clone)]
pub struct DispatchPlan {
    thread_id: String,
    recipient_name: String,
    payload: OutgoingMessage,
    send_time: SendTime<Local>,
}

impl DispatchPlan {
    pub fn new(
        thread_id: String,
        recipient_name: String,
        body: &str,
        send_time: SendTime<Local>,
    ) -> Self {
        Self {
            thread_id,
            recipient_name,
            payload: build_payload(body),
            send_time,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn recipient_name(&self) -> &str {
        &self.recipient_name
    }

    pub fn payload(&self) -> &OutgoingMessage {
        &self.payload
    }

    #[cfg(test)]
    pub fn send_time(&self) -> &SendTime<Local> {
        &self.send_time
    }

    pub fn jitter_seconds(&self) -> u32 {
        self.send_time.jitter.total_seconds()
    }

    /// Prints the delay, recipient and send time.
    pub fn announce(&self) {
        console::line(format!(
            "The random delay is {}.",
            palette::time(&self.send_time.jitter.to_string())
        ));
        console::line(format!(
            "{} will be sent to {} at {}. Current time is {}.",
            palette::data(&describe_payload(&self.payload)),
            palette::name(&self.recipient_name),
            palette::time(&self.send_time.formatted),
            palette::time(&formatted_now()),
        ));
        console::blank();
    }
}

/// An armed plan waiting for its trigger.
pub struct ArmedDispatch {
    trigger: Arc<ArmedTrigger>,
    completion: oneshot::Receiver<Result<(), PlatformError>>,
}

impl ArmedDispatch {
    pub fn trigger(&self) -> Arc<ArmedTrigger> {
        self.trigger.clone()
    }

    /// Resolves once the message was sent (or sending failed).
    pub async fn completed(self) -> Result<()> {
        match self.completion.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!(e).context("Failed to send message")),
            Err(_) => bail!("Dispatch trigger stopped before sending"),
        }
    }
}

/// Arms exactly one trigger for the plan.
///
/// # Errors
///
/// Fails when the trigger expression built from the send instant is not
/// well-formed.
pub fn arm(
    plan: DispatchPlan,
    session: Arc<dyn PlatformSession>,
    logger: Arc<StructuredLogger>,
) -> Result<ArmedDispatch> {
    let expression = TriggerExpression::from_instant(&plan.send_time.instant)?;
    let fire_at = plan.send_time.instant;

    logger.record(RunEvent::TriggerArmed {
        expression: expression.to_string(),
        fire_at: plan.send_time.formatted.clone(),
        jitter_seconds: plan.jitter_seconds(),
    });
    tracing::debug!(%expression, %fire_at, "dispatch armed");

    let (done_tx, completion) = oneshot::channel();
    let trigger = ArmedTrigger::arm_at(expression, fire_at, move || async move {
        let result = session.send_message(plan.payload(), plan.thread_id()).await;
        match &result {
            Ok(()) => {
                console::blank();
                console::line(format!(
                    "Sent {} to {} at {}.",
                    palette::data(&describe_payload(&plan.payload)),
                    palette::name(plan.recipient_name()),
                    palette::time(&formatted_now()),
                ));
                console::blank();
                logger.record(RunEvent::MessageSent {
                    thread_id: plan.thread_id.clone(),
                    payload: describe_payload(&plan.payload),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "send failed");
                logger.record(RunEvent::SendFailed {
                    thread_id: plan.thread_id.clone(),
                    error: e.to_string(),
                });
            }
        }
        // The receiver is gone only if the run already ended
        let _ = done_tx.send(result);
    });

    Ok(ArmedDispatch {
        trigger: Arc::new(trigger),
        completion,
    })
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
