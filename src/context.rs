//! The single owned run context: collected settings plus the force-login flag.

use crate::config::AppConfig;

#[derive(Debug, Clone, Default)]
pub struct AppContext {
    config: AppConfig,
    config_file_used: bool,
    force_login: bool,
}

impl AppContext {
    pub fn new(config: AppConfig, config_file_used: bool) -> Self {
        Self {
            config,
            config_file_used,
            force_login: false,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// True when values were taken from the config file.
    pub fn config_file_used(&self) -> bool {
        self.config_file_used
    }

    pub fn email(&self) -> Option<&str> {
        self.config.email.as_deref()
    }

    pub fn set_email(&mut self, email: String) {
        self.config.email = Some(email);
    }

    /// Forgets the login email so the next attempt asks for it again.
    pub fn clear_email(&mut self) {
        self.config.email = None;
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.config.thread_id.as_deref()
    }

    pub fn set_thread_id(&mut self, thread_id: String) {
        self.config.thread_id = Some(thread_id);
    }

    pub fn force_login(&self) -> bool {
        self.force_login
    }

    /// Once enabled, stays on for the rest of the process.
    pub fn enable_force_login(&mut self) {
        self.force_login = true;
    }
}
