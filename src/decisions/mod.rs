//! Interactive decision points.
//!
//! Control flow never reads the terminal directly; it asks a
//! [`DecisionProvider`]. The binary uses the dialoguer-backed provider in
//! `prompt`, tests use `scripted::ScriptedDecisions`.

#[cfg(test)]
pub mod scripted;

use crate::discovery::RecipientCandidate;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Answer to the recipient selection list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Refresh,
    /// Index into the candidates shown.
    Pick(usize),
}

#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// A config file exists: take its values?
    async fn use_config_file(&self, path: &Path) -> Result<bool>;

    /// Overwrite the config file with the collected values?
    async fn save_config_file(&self, path: &Path) -> Result<bool>;

    /// Login email, pre-filled with `initial` when known.
    async fn login_email(&self, initial: Option<&str>) -> Result<String>;

    /// Always asked fresh, never stored.
    async fn login_password(&self) -> Result<String>;

    /// After a step-up verification failure: retry with force login?
    async fn confirm_force_login(&self) -> Result<bool>;

    /// No thread ID known: monitor incoming messages (true) or type one in?
    async fn start_discovery(&self) -> Result<bool>;

    async fn thread_id(&self) -> Result<String>;

    async fn message(&self) -> Result<String>;

    /// 24h time of day, `HHMM` or `HH:MM`.
    async fn send_time(&self) -> Result<String>;

    async fn max_delay_minutes(&self) -> Result<u32>;

    /// Shown while no candidates were discovered yet.
    async fn wait_for_refresh(&self) -> Result<()>;

    async fn select_recipient(&self, candidates: &[RecipientCandidate]) -> Result<Selection>;

    /// "Press Enter to exit."
    async fn wait_for_exit(&self) -> Result<()>;
}
