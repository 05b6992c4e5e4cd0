use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::models::message::Turn;
use crate::models::tool::Tool;
use crate::providers::base::{Completion, Provider, Usage};

/// A provider that replays scripted completions, for tests.
///
/// Clones share the script and the recorded histories.
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Result<Completion, String>>>>,
    seen: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<Completion>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Like [`MockProvider::new`], but any step may fail with the given message
    pub fn scripted(responses: Vec<Result<Completion, String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The history passed to each call so far
    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        history: &[Turn],
        _tools: &[Tool],
    ) -> Result<(Completion, Usage)> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(history.to_vec());
        }

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| anyhow!("mock provider poisoned"))?;
        if responses.is_empty() {
            // Out of script: an empty completion ends the reply
            return Ok((Completion::default(), Usage::default()));
        }
        match responses.remove(0) {
            Ok(completion) => Ok((completion, Usage::default())),
            Err(message) => Err(anyhow!(message)),
        }
    }
}
