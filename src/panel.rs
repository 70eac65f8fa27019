//! Panel mode: concurrent drafts from every worker, merged by a curator.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::OrchestratorError;
use crate::observer::{Event, SharedObserver};
use crate::provider::{ProviderRegistry, ProviderResponse};

/// Result of a completed panel run.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelOutcome {
    pub curator: String,
    /// Worker names in the order they were asked.
    pub workers: Vec<String>,
    pub drafts: BTreeMap<String, ProviderResponse>,
    pub answer: ProviderResponse,
}

impl PanelOutcome {
    /// Number of drafts that made it into the curation prompt.
    pub fn accepted_drafts(&self) -> usize {
        self.drafts.values().filter(|r| r.is_success()).count()
    }
}

pub struct PanelCoordinator {
    registry: Arc<ProviderRegistry>,
    observer: SharedObserver,
}

impl PanelCoordinator {
    pub fn new(registry: Arc<ProviderRegistry>, observer: SharedObserver) -> Self {
        Self { registry, observer }
    }

    /// Ask every known provider in `names` concurrently and wait for all of
    /// them. Unknown names are skipped.
    pub async fn run_parallel(
        &self,
        prompt: &str,
        names: &[String],
    ) -> BTreeMap<String, ProviderResponse> {
        let mut calls = Vec::new();
        for name in names {
            match self.registry.get(name) {
                Some(provider) => {
                    let provider = Arc::clone(provider);
                    let name = name.clone();
                    calls.push(async move {
                        let response = provider.ask(prompt).await;
                        (name, response)
                    });
                }
                None => tracing::warn!(provider = %name, "provider not found, skipping"),
            }
        }

        let results = join_all(calls).await;
        for (name, response) in &results {
            self.observer.notify(&Event::PanelDraft {
                provider: name,
                duration: response.duration,
                error: response.error.as_deref(),
            });
        }
        results.into_iter().collect()
    }

    /// Fan the prompt out to every provider except `curator`, then have the
    /// curator synthesize one answer from the successful drafts.
    pub async fn mode_panel(
        &self,
        prompt: &str,
        curator: &str,
    ) -> Result<PanelOutcome, OrchestratorError> {
        let curator_provider =
            self.registry
                .get(curator)
                .ok_or_else(|| OrchestratorError::ProviderNotFound {
                    name: curator.to_string(),
                })?;

        let workers: Vec<String> = self
            .registry
            .names()
            .into_iter()
            .filter(|n| n != curator)
            .collect();
        if workers.is_empty() {
            return Err(OrchestratorError::NoPanelWorkers {
                curator: curator.to_string(),
            });
        }
        tracing::info!(curator, workers = %workers.join(", "), "panel started");

        let start = Instant::now();
        let drafts = self.run_parallel(prompt, &workers).await;
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "drafts gathered");

        let accepted: Vec<(&str, &str)> = workers
            .iter()
            .filter_map(|name| {
                drafts
                    .get(name)
                    .filter(|r| r.is_success())
                    .map(|r| (name.as_str(), r.content.as_str()))
            })
            .collect();
        if accepted.is_empty() {
            return Err(OrchestratorError::NoValidDrafts {
                workers: workers.len(),
            });
        }

        self.observer.notify(&Event::CurationStarted {
            curator,
            drafts: accepted.len(),
        });
        let answer = curator_provider
            .ask(&curation_prompt(prompt, &accepted))
            .await;
        if let Some(error) = &answer.error {
            return Err(OrchestratorError::CuratorFailed {
                curator: curator.to_string(),
                message: error.clone(),
            });
        }

        Ok(PanelOutcome {
            curator: curator.to_string(),
            workers,
            drafts,
            answer,
        })
    }
}

/// Build the curator prompt from `(worker, draft)` pairs.
pub fn curation_prompt(prompt: &str, drafts: &[(&str, &str)]) -> String {
    let mut text = String::from(
        "You are the Chief Editor and Curator. I have a user request and \
         several draft answers from different AI models.\n\
         Your goal is to synthesize a single, perfect response.\n\
         Analyze the drafts for accuracy, completeness, and clarity. Fix any errors.\n\n",
    );
    text.push_str(&format!("ORIGINAL USER REQUEST: '{}'\n\n", prompt));
    for (name, content) in drafts {
        text.push_str(&format!(
            "--- DRAFT FROM {} ---\n{}\n\n",
            name.to_uppercase(),
            content
        ));
    }
    text.push_str("--- END OF DRAFTS ---\n");
    text.push_str(
        "Please provide the final, synthesized answer below. \
         Do not just list the drafts; create a cohesive response.",
    );
    text
}
