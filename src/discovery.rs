//! Thread discovery: builds a recipient list from incoming messages and lets
//! the user pick one.

use crate::decisions::{DecisionProvider, Selection};
use crate::platform::InboundEvent;
use crate::recipient::RecipientResolver;
use crate::session::Session;
use crate::structured_logger::{RunEvent, StructuredLogger};
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientCandidate {
    pub display_name: String,
    pub raw_identifier: String,
}

/// Append-only candidate list, unique by identifier, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct CandidateList {
    inner: Arc<Mutex<Vec<RecipientCandidate>>>,
}

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<RecipientCandidate>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries()
            .iter()
            .any(|candidate| candidate.raw_identifier == identifier)
    }

    /// Returns false when the identifier is already listed.
    pub fn insert(&self, candidate: RecipientCandidate) -> bool {
        let mut entries = self.entries();
        if entries
            .iter()
            .any(|existing| existing.raw_identifier == candidate.raw_identifier)
        {
            return false;
        }
        entries.push(candidate);
        true
    }

    pub fn snapshot(&self) -> Vec<RecipientCandidate> {
        self.entries().clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

pub struct ThreadDiscovery {
    resolver: RecipientResolver,
    logger: Arc<StructuredLogger>,
    candidates: CandidateList,
}

impl ThreadDiscovery {
    pub fn new(resolver: RecipientResolver, logger: Arc<StructuredLogger>) -> Self {
        Self {
            resolver,
            logger,
            candidates: CandidateList::new(),
        }
    }

    pub fn candidates(&self) -> &CandidateList {
        &self.candidates
    }

    /// Collects candidates from the inbound stream until the user picks one.
    ///
    /// The handler is unsubscribed before returning, so the list stops
    /// growing once a recipient is chosen.
    pub async fn discover_and_select(
        &self,
        session: &Session,
        decisions: &dyn DecisionProvider,
    ) -> Result<RecipientCandidate> {
        if !session.is_active() {
            bail!("Unable to establish connection.");
        }

        let resolver = self.resolver.clone();
        let candidates = self.candidates.clone();
        let logger = self.logger.clone();
        let subscription = session.stream().subscribe("thread-discovery", move |event| {
            let resolver = resolver.clone();
            let candidates = candidates.clone();
            let logger = logger.clone();
            async move { record_candidate(event, &resolver, &candidates, &logger).await }
        });

        loop {
            let shown = self.candidates.snapshot();
            if shown.is_empty() {
                decisions.wait_for_refresh().await?;
                continue;
            }

            match decisions.select_recipient(&shown).await? {
                Selection::Refresh => continue,
                Selection::Pick(index) => {
                    let Some(choice) = shown.get(index) else {
                        tracing::warn!(index, "selection out of range");
                        continue;
                    };
                    subscription.unsubscribe();
                    self.logger.record(RunEvent::RecipientSelected {
                        thread_id: choice.raw_identifier.clone(),
                    });
                    return Ok(choice.clone());
                }
            }
        }
    }
}

async fn record_candidate(
    event: InboundEvent,
    resolver: &RecipientResolver,
    candidates: &CandidateList,
    logger: &StructuredLogger,
) {
    let Some(identifier) = event.conversation_id() else {
        return;
    };
    if candidates.contains(identifier) {
        return;
    }

    let display_name = match resolver.resolve_name(identifier).await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(identifier, error = %e, "skipping unresolvable thread");
            return;
        }
    };

    let candidate = RecipientCandidate {
        display_name,
        raw_identifier: identifier.to_string(),
    };
    if candidates.insert(candidate.clone()) {
        tracing::debug!(identifier, name = %candidate.display_name, "discovered thread");
        logger.record(RunEvent::CandidateDiscovered {
            thread_id: candidate.raw_identifier,
            display_name: candidate.display_name,
        });
    }
}

#[cfg(test)]
#[path = "tests/discovery_tests.rs"]
mod tests;
