//! Persisted login session (`app-state.json`).

use crate::platform::AppState;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;

pub trait AppStateStore: Send + Sync {
    /// `Ok(None)` when nothing was persisted. Unreadable or malformed content
    /// is an error; callers decide whether that matters.
    fn load(&self) -> Result<Option<AppState>>;

    fn save(&self, state: &AppState) -> Result<()>;

    fn location(&self) -> String;
}

pub struct FileAppStateStore {
    path: PathBuf,
}

impl FileAppStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl AppStateStore for FileAppStateStore {
    fn load(&self) -> Result<Option<AppState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read app state: {}", self.path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse app state: {}", self.path.display()))?;
        if value.is_null() {
            bail!("App state file is empty: {}", self.path.display());
        }
        Ok(Some(AppState(value)))
    }

    /// Writes to a temporary file first, then renames over the target.
    fn save(&self, state: &AppState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string(state).context("Failed to serialize app state")?;

        fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write temp app state: {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename temp file to: {}", self.path.display()))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
#[path = "tests/app_state_tests.rs"]
mod tests;
