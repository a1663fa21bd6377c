//! Terminal decision provider built on dialoguer.
//!
//! dialoguer blocks on stdin, so every prompt runs on the blocking pool.

use crate::config::validate_thread_id;
use crate::decisions::{DecisionProvider, Selection};
use crate::discovery::RecipientCandidate;
use crate::dispatch::LIKE_STICKER_ALIAS;
use crate::send_time::{parse_time_of_day, validate_max_delay_minutes};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::Path;

const REFRESH_ITEM: &str = "-> Refresh <-";
const DEFAULT_MAX_DELAY_MINUTES: u32 = 10;

async fn blocking<T, F>(prompt: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    let answer = tokio::task::spawn_blocking(prompt)
        .await
        .context("Prompt task failed")?;
    answer.context("Failed to read input")
}

fn confirm(prompt: String, default: bool) -> impl FnOnce() -> dialoguer::Result<bool> {
    move || Confirm::new().with_prompt(prompt).default(default).interact()
}

fn press_enter(prompt: &'static str) -> impl FnOnce() -> dialoguer::Result<()> {
    move || {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .report(false)
            .interact_text()
            .map(|_| ())
    }
}

#[derive(Debug, Default)]
pub struct TerminalDecisions;

impl TerminalDecisions {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecisionProvider for TerminalDecisions {
    async fn use_config_file(&self, path: &Path) -> Result<bool> {
        let prompt = format!(
            "Found {}. Do you want to use the values from your config? (no: manually input settings)",
            path.display()
        );
        blocking(confirm(prompt, true)).await
    }

    async fn save_config_file(&self, path: &Path) -> Result<bool> {
        let prompt = format!(
            "Do you want to save your config? (Will overwrite {}.)",
            path.display()
        );
        blocking(confirm(prompt, false)).await
    }

    async fn login_email(&self, initial: Option<&str>) -> Result<String> {
        let initial = initial.map(str::to_string);
        blocking(move || {
            let mut input = Input::<String>::new().with_prompt("Enter your login email");
            if let Some(initial) = initial {
                input = input.with_initial_text(initial);
            }
            input
                .validate_with(|email: &String| {
                    if email.trim().is_empty() {
                        Err("Email is required.")
                    } else {
                        Ok(())
                    }
                })
                .interact_text()
                .map(|email| email.trim().to_string())
        })
        .await
    }

    async fn login_password(&self) -> Result<String> {
        blocking(|| Password::new().with_prompt("Enter your password").interact()).await
    }

    async fn confirm_force_login(&self) -> Result<bool> {
        blocking(confirm(
            "Try a force login on next attempt?".to_string(),
            false,
        ))
        .await
    }

    async fn start_discovery(&self) -> Result<bool> {
        blocking(confirm(
            "Start monitoring messages to get thread IDs? (no: enter thread ID manually)"
                .to_string(),
            true,
        ))
        .await
    }

    async fn thread_id(&self) -> Result<String> {
        blocking(|| {
            Input::<String>::new()
                .with_prompt("Enter the thread ID. Your message will be sent to this user/group")
                .validate_with(|id: &String| validate_thread_id(id))
                .interact_text()
                .map(|id| id.trim().to_string())
        })
        .await
    }

    async fn message(&self) -> Result<String> {
        blocking(|| {
            Input::<String>::new()
                .with_prompt(format!(
                    "Enter your message. Type \"{}\" (without quotes) to send the default like/thumbs-up sticker",
                    LIKE_STICKER_ALIAS
                ))
                .default(LIKE_STICKER_ALIAS.to_string())
                .interact_text()
        })
        .await
    }

    async fn send_time(&self) -> Result<String> {
        blocking(|| {
            Input::<String>::new()
                .with_prompt(
                    "Enter the time you want the message to be sent (random delay is added on top of this). Must be in 24h time format, e.g. 0530 or 1730",
                )
                .validate_with(|time: &String| {
                    parse_time_of_day(time)
                        .map(|_| ())
                        .map_err(|_| "Not a valid time.".to_string())
                })
                .interact_text()
                .map(|time| time.trim().to_string())
        })
        .await
    }

    async fn max_delay_minutes(&self) -> Result<u32> {
        blocking(|| {
            Input::<u32>::new()
                .with_prompt(
                    "Enter the maximum number of minutes for the randomized delay (must be less than 60)",
                )
                .default(DEFAULT_MAX_DELAY_MINUTES)
                .validate_with(|minutes: &u32| validate_max_delay_minutes(*minutes))
                .interact_text()
        })
        .await
    }

    async fn wait_for_refresh(&self) -> Result<()> {
        blocking(press_enter("No threads found yet. Press Enter to refresh")).await
    }

    async fn select_recipient(&self, candidates: &[RecipientCandidate]) -> Result<Selection> {
        let mut items = vec![REFRESH_ITEM.to_string()];
        items.extend(
            candidates
                .iter()
                .map(|c| format!("{} ({})", c.display_name, c.raw_identifier)),
        );

        let index = blocking(move || {
            Select::new()
                .with_prompt("Select a user/group (arrow keys, Enter to select)")
                .items(&items)
                .default(1)
                .interact()
        })
        .await?;

        Ok(match index {
            0 => Selection::Refresh,
            i => Selection::Pick(i - 1),
        })
    }

    async fn wait_for_exit(&self) -> Result<()> {
        blocking(press_enter("Press Enter to exit")).await
    }
}
