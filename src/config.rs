//! Key=value configuration file intake and persistence.
//!
//! The file holds any subset of the run settings. Values that are present are
//! treated as pre-filled answers and validated exactly like interactive input;
//! values that fail validation are discarded so the user is prompted instead.

use crate::send_time::{parse_time_of_day, validate_max_delay_minutes};
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;

/// Keys understood in the config file, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Email,
    ThreadId,
    Message,
    Time,
    MaxDelayMinutes,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::Email,
        ConfigKey::ThreadId,
        ConfigKey::Message,
        ConfigKey::Time,
        ConfigKey::MaxDelayMinutes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::Email => "email",
            ConfigKey::ThreadId => "threadID",
            ConfigKey::Message => "message",
            ConfigKey::Time => "time",
            ConfigKey::MaxDelayMinutes => "maxDelayMinutes",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run settings collected from the config file and prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub email: Option<String>,
    pub thread_id: Option<String>,
    pub message: Option<String>,
    pub time: Option<String>,
    pub max_delay_minutes: Option<u32>,
}

impl AppConfig {
    /// Parses key=value text. Unknown keys are ignored, invalid values dropped.
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw_value)) = line.split_once('=') else {
                continue;
            };
            let Some(key) = ConfigKey::from_key(key.trim()) else {
                continue;
            };
            let value = unquote(raw_value.trim());
            config.set_raw(key, &value);
        }

        config
    }

    /// Loads the config file, returning `None` when it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Ok(Some(Self::parse(&content)))
    }

    /// Overwrites the config file with the current values.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        fs::write(path, self.to_file_string())
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn to_file_string(&self) -> String {
        let mut out = String::new();
        for key in ConfigKey::ALL {
            let value = self.value(key).unwrap_or_default();
            out.push_str(key.as_str());
            out.push('=');
            out.push_str(&quote(&value));
            out.push('\n');
        }
        out
    }

    /// Returns the display value for a key, if set.
    pub fn value(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::Email => self.email.clone(),
            ConfigKey::ThreadId => self.thread_id.clone(),
            ConfigKey::Message => self.message.clone(),
            ConfigKey::Time => self.time.clone(),
            ConfigKey::MaxDelayMinutes => self.max_delay_minutes.map(|m| m.to_string()),
        }
    }

    /// Keys that are missing or were discarded as invalid.
    pub fn missing_keys(&self) -> Vec<ConfigKey> {
        ConfigKey::ALL
            .into_iter()
            .filter(|key| self.value(*key).is_none())
            .collect()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.missing_keys().len() == ConfigKey::ALL.len()
    }

    fn set_raw(&mut self, key: ConfigKey, value: &str) {
        let value = value.trim();
        match key {
            ConfigKey::Email => self.email = non_empty(value),
            ConfigKey::ThreadId => {
                self.thread_id = validate_thread_id(value).ok().map(|_| value.to_string())
            }
            ConfigKey::Message => self.message = non_empty(value),
            ConfigKey::Time => {
                self.time = parse_time_of_day(value).ok().map(|_| value.to_string())
            }
            ConfigKey::MaxDelayMinutes => {
                self.max_delay_minutes = value
                    .parse::<u32>()
                    .ok()
                    .filter(|m| validate_max_delay_minutes(*m).is_ok())
            }
        }
    }
}

/// Validates a thread identifier: any non-empty token without whitespace.
pub fn validate_thread_id(value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err("Not a valid thread ID.".to_string());
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return inner.to_string();
    }
    if let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        return out;
    }
    value.to_string()
}

fn quote(value: &str) -> String {
    let needs_quotes = value != value.trim()
        || value.contains(['#', '"', '\'', '\n', '\\']);
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
