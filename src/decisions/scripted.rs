//! Decision provider answering from pre-loaded queues.

use super::{DecisionProvider, Selection};
use crate::discovery::RecipientCandidate;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const MAX_REFRESHES: usize = 100;

type RefreshHook = Box<dyn FnMut(usize) + Send>;

#[derive(Default)]
pub struct ScriptedDecisions {
    use_config: Mutex<VecDeque<bool>>,
    save_config: Mutex<VecDeque<bool>>,
    emails: Mutex<VecDeque<String>>,
    passwords: Mutex<VecDeque<String>>,
    force_login: Mutex<VecDeque<bool>>,
    discovery: Mutex<VecDeque<bool>>,
    thread_ids: Mutex<VecDeque<String>>,
    messages: Mutex<VecDeque<String>>,
    times: Mutex<VecDeque<String>>,
    delays: Mutex<VecDeque<u32>>,
    selections: Mutex<VecDeque<Selection>>,
    on_refresh: Mutex<Option<RefreshHook>>,
    refreshes: Mutex<usize>,
    email_prefills: Mutex<Vec<Option<String>>>,
    shown_candidates: Mutex<Vec<Vec<RecipientCandidate>>>,
    exit_prompts: Mutex<usize>,
}

fn next<T>(queue: &Mutex<VecDeque<T>>, question: &str) -> Result<T> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .ok_or_else(|| anyhow!("unexpected prompt: {}", question))
}

impl ScriptedDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_config(self, answer: bool) -> Self {
        self.use_config.lock().unwrap().push_back(answer);
        self
    }

    pub fn save_config(self, answer: bool) -> Self {
        self.save_config.lock().unwrap().push_back(answer);
        self
    }

    pub fn email(self, email: &str) -> Self {
        self.emails.lock().unwrap().push_back(email.to_string());
        self
    }

    pub fn password(self, password: &str) -> Self {
        self.passwords.lock().unwrap().push_back(password.to_string());
        self
    }

    pub fn passwords(self, count: usize) -> Self {
        for i in 0..count {
            self.passwords.lock().unwrap().push_back(format!("secret-{}", i));
        }
        self
    }

    pub fn force_login(self, answer: bool) -> Self {
        self.force_login.lock().unwrap().push_back(answer);
        self
    }

    pub fn discovery(self, answer: bool) -> Self {
        self.discovery.lock().unwrap().push_back(answer);
        self
    }

    pub fn thread_id(self, thread_id: &str) -> Self {
        self.thread_ids.lock().unwrap().push_back(thread_id.to_string());
        self
    }

    pub fn message(self, message: &str) -> Self {
        self.messages.lock().unwrap().push_back(message.to_string());
        self
    }

    pub fn time(self, time: &str) -> Self {
        self.times.lock().unwrap().push_back(time.to_string());
        self
    }

    pub fn delay(self, minutes: u32) -> Self {
        self.delays.lock().unwrap().push_back(minutes);
        self
    }

    pub fn select(self, selection: Selection) -> Self {
        self.selections.lock().unwrap().push_back(selection);
        self
    }

    /// Runs `hook` with the refresh count every time the refresh prompt shows.
    pub fn on_refresh(self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        *self.on_refresh.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn refresh_count(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }

    pub fn email_prefills(&self) -> Vec<Option<String>> {
        self.email_prefills.lock().unwrap().clone()
    }

    pub fn shown_candidates(&self) -> Vec<Vec<RecipientCandidate>> {
        self.shown_candidates.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn exit_prompts(&self) -> usize {
        *self.exit_prompts.lock().unwrap()
    }

    pub fn remaining_passwords(&self) -> usize {
        self.passwords.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisions {
    async fn use_config_file(&self, _path: &Path) -> Result<bool> {
        next(&self.use_config, "use config file")
    }

    async fn save_config_file(&self, _path: &Path) -> Result<bool> {
        next(&self.save_config, "save config file")
    }

    async fn login_email(&self, initial: Option<&str>) -> Result<String> {
        self.email_prefills
            .lock()
            .unwrap()
            .push(initial.map(str::to_string));
        next(&self.emails, "login email")
    }

    async fn login_password(&self) -> Result<String> {
        next(&self.passwords, "login password")
    }

    async fn confirm_force_login(&self) -> Result<bool> {
        next(&self.force_login, "force login")
    }

    async fn start_discovery(&self) -> Result<bool> {
        next(&self.discovery, "start discovery")
    }

    async fn thread_id(&self) -> Result<String> {
        next(&self.thread_ids, "thread id")
    }

    async fn message(&self) -> Result<String> {
        next(&self.messages, "message")
    }

    async fn send_time(&self) -> Result<String> {
        next(&self.times, "send time")
    }

    async fn max_delay_minutes(&self) -> Result<u32> {
        next(&self.delays, "max delay minutes")
    }

    async fn wait_for_refresh(&self) -> Result<()> {
        let count = {
            let mut refreshes = self.refreshes.lock().unwrap();
            *refreshes += 1;
            *refreshes
        };
        if count > MAX_REFRESHES {
            return Err(anyhow!("refreshed {} times without candidates", MAX_REFRESHES));
        }
        if let Some(hook) = self.on_refresh.lock().unwrap().as_mut() {
            hook(count);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn select_recipient(&self, candidates: &[RecipientCandidate]) -> Result<Selection> {
        self.shown_candidates
            .lock()
            .unwrap()
            .push(candidates.to_vec());
        let selection = next(&self.selections, "select recipient")?;
        if selection == Selection::Refresh {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(selection)
    }

    async fn wait_for_exit(&self) -> Result<()> {
        *self.exit_prompts.lock().unwrap() += 1;
        Ok(())
    }
}
