//! Centralized home-based storage paths for all auto-messenger persistence.
//!
//! Everything lives under `~/.auto-messenger/`:
//! - `config.txt` - key=value configuration
//! - `app-state.json` - persisted login session
//! - `logs/events.jsonl` - structured event log

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

/// The name of the auto-messenger directory.
const AUTO_MESSENGER_DIR: &str = ".auto-messenger";

pub const CONFIG_FILE_NAME: &str = "config.txt";
pub const APP_STATE_FILE_NAME: &str = "app-state.json";

thread_local! {
    static HOME_OVERRIDE: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

/// Returns the home-based auto-messenger directory: `~/.auto-messenger/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn auto_messenger_home_dir() -> Result<PathBuf> {
    let dir = match HOME_OVERRIDE.with(|home| home.borrow().clone()) {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("Could not determine home directory for auto-messenger storage")?
            .join(AUTO_MESSENGER_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the config file path: `~/.auto-messenger/config.txt`
pub fn config_path() -> Result<PathBuf> {
    Ok(auto_messenger_home_dir()?.join(CONFIG_FILE_NAME))
}

/// Returns the persisted session path: `~/.auto-messenger/app-state.json`
pub fn app_state_path() -> Result<PathBuf> {
    Ok(auto_messenger_home_dir()?.join(APP_STATE_FILE_NAME))
}

/// Returns the logs directory: `~/.auto-messenger/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = auto_messenger_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Restores the previous home directory when dropped.
#[cfg(test)]
pub struct TestHomeGuard {
    previous: Option<PathBuf>,
}

#[cfg(test)]
impl Drop for TestHomeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        HOME_OVERRIDE.with(|home| *home.borrow_mut() = previous);
    }
}

/// Redirects the auto-messenger home directory for the current thread.
///
/// Tokio tasks can migrate between threads, so async tests using this
/// must run on a current-thread runtime and be `#[serial]`.
#[cfg(test)]
pub fn set_home_for_test(dir: PathBuf) -> TestHomeGuard {
    let previous = HOME_OVERRIDE.with(|home| home.borrow_mut().replace(dir));
    TestHomeGuard { previous }
}

#[cfg(test)]
#[path = "tests/app_paths_tests.rs"]
mod tests;
