//! Top-level control flow: config intake, login, recipient, schedule.

use crate::config::{AppConfig, ConfigKey};
use crate::context::AppContext;
use crate::decisions::DecisionProvider;
use crate::discovery::ThreadDiscovery;
use crate::dispatch::{self, ArmedDispatch, DispatchPlan};
use crate::logging::{console, palette};
use crate::platform::MessengerPlatform;
use crate::recipient::RecipientResolver;
use crate::send_time::compute_send_instant;
use crate::session::app_state::FileAppStateStore;
use crate::session::{Session, SessionManager};
use crate::shutdown::Shutdown;
use crate::structured_logger::StructuredLogger;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

const WELCOME: &str = "Welcome to auto-messenger! This program logs in to your messenger account, \
waits until the time you choose (plus a small random delay) and sends one message to one \
user or group chat.";

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub config_path: PathBuf,
    pub app_state_path: PathBuf,
}

/// Values the dispatch needs, all present once intake finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Schedule {
    message: String,
    time: String,
    max_delay_minutes: u32,
}

pub struct App {
    options: AppOptions,
    platform: Arc<dyn MessengerPlatform>,
    decisions: Arc<dyn DecisionProvider>,
    logger: Arc<StructuredLogger>,
    shutdown: Arc<Shutdown>,
}

impl App {
    pub fn new(
        options: AppOptions,
        platform: Arc<dyn MessengerPlatform>,
        decisions: Arc<dyn DecisionProvider>,
        logger: Arc<StructuredLogger>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            options,
            platform,
            decisions,
            logger,
            shutdown,
        }
    }

    /// Runs until the message was sent.
    pub async fn run(&self) -> Result<()> {
        let armed = self.arm_dispatch().await?;
        armed.completed().await
    }

    /// Everything up to and including arming the trigger. The session and
    /// trigger are handed to the shutdown handler as soon as they exist.
    pub async fn arm_dispatch(&self) -> Result<ArmedDispatch> {
        console::line(palette::bold(WELCOME));
        console::blank();

        let mut context = self.intake_config().await?;

        let mut manager = SessionManager::new(
            self.platform.clone(),
            Arc::new(FileAppStateStore::new(self.options.app_state_path.clone())),
            self.logger.clone(),
        )
        .with_shutdown(self.shutdown.clone());
        let session = Arc::new(
            manager
                .establish_session(&mut context, self.decisions.as_ref())
                .await?,
        );
        tracing::debug!(state = %manager.state(), "session ready");
        self.shutdown.set_session(session.clone());

        let (thread_id, recipient_name) = self.choose_recipient(&mut context, &session).await?;
        console::line(format!(
            "Message will be sent to {}. Thread ID: {}",
            palette::name(&recipient_name),
            palette::data(&thread_id)
        ));
        console::blank();

        let schedule = self.complete_schedule(&mut context).await?;
        self.offer_save(context.config()).await?;

        let send_time = compute_send_instant(&schedule.time, schedule.max_delay_minutes)
            .with_context(|| format!("Invalid send time: {}", schedule.time))?;
        let plan = DispatchPlan::new(thread_id, recipient_name, &schedule.message, send_time);
        plan.announce();

        let armed = dispatch::arm(plan, session.handle(), self.logger.clone())?;
        self.shutdown.set_trigger(armed.trigger());
        Ok(armed)
    }

    async fn intake_config(&self) -> Result<AppContext> {
        let path = &self.options.config_path;
        let Some(loaded) = AppConfig::load(path)? else {
            tracing::debug!(path = %path.display(), "no config file");
            return Ok(AppContext::default());
        };

        if !self.decisions.use_config_file(path).await? {
            return Ok(AppContext::default());
        }

        console::line(format!(
            "Using values from {}:",
            palette::property(&path.display().to_string())
        ));
        let missing = loaded.missing_keys();
        for key in ConfigKey::ALL {
            if let Some(value) = loaded.value(key) {
                console::line(format!("  {}={}", palette::property(key.as_str()), value));
            }
        }
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
            console::caution(&format!(
                "Missing or invalid in config: {}. You will be asked for these.",
                names.join(", ")
            ));
        }
        console::blank();

        Ok(AppContext::new(loaded, true))
    }

    async fn choose_recipient(
        &self,
        context: &mut AppContext,
        session: &Session,
    ) -> Result<(String, String)> {
        let resolver = RecipientResolver::new(session.handle(), self.logger.clone());

        if let Some(thread_id) = context.thread_id() {
            let thread_id = thread_id.to_string();
            let name = resolver.resolve_name(&thread_id).await?;
            return Ok((thread_id, name));
        }

        if context.config_file_used() {
            console::info("No thread ID was provided.");
        }

        if self.decisions.start_discovery().await? {
            console::info(
                "Listening for messages. Ask the recipient to send you a message, then refresh.",
            );
            let discovery = ThreadDiscovery::new(resolver, self.logger.clone());
            let chosen = discovery
                .discover_and_select(session, self.decisions.as_ref())
                .await?;
            tracing::debug!(
                discovered = discovery.candidates().snapshot().len(),
                "recipient chosen from discovery"
            );
            context.set_thread_id(chosen.raw_identifier.clone());
            return Ok((chosen.raw_identifier, chosen.display_name));
        }

        let thread_id = self.decisions.thread_id().await?;

        let name = resolver.resolve_name(&thread_id).await?;
        context.set_thread_id(thread_id.clone());
        Ok((thread_id, name))
    }

    async fn complete_schedule(&self, context: &mut AppContext) -> Result<Schedule> {
        let config = context.config_mut();

        let message = match config.message.clone() {
            Some(message) => message,
            None => self.decisions.message().await?,
        };
        let time = match config.time.clone() {
            Some(time) => time,
            None => self.decisions.send_time().await?,
        };
        let max_delay_minutes = match config.max_delay_minutes {
            Some(minutes) => minutes,
            None => self.decisions.max_delay_minutes().await?,
        };

        config.message = Some(message.clone());
        config.time = Some(time.clone());
        config.max_delay_minutes = Some(max_delay_minutes);

        Ok(Schedule {
            message,
            time,
            max_delay_minutes,
        })
    }

    async fn offer_save(&self, config: &AppConfig) -> Result<()> {
        let path = &self.options.config_path;
        if !self.decisions.save_config_file(path).await? {
            return Ok(());
        }
        config.save(path)?;
        console::info(&format!("Saved config to {}.", path.display()));
        console::blank();
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
