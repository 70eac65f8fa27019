//! In-memory provider double with a scripted sequence of responses.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{Provider, ProviderResponse};

#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail(String),
}

pub struct ScriptedProvider {
    name: String,
    available: AtomicBool,
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Vec<Reply>) -> Self {
        Self {
            name: name.to_string(),
            available: AtomicBool::new(true),
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `content`.
    pub fn ok(name: &str, content: &str) -> Self {
        Self::new(name, vec![Reply::Ok(content.to_string())])
    }

    /// Always fails with `error` (classified like a real provider error).
    pub fn failing(name: &str, error: &str) -> Self {
        Self::new(name, vec![Reply::Fail(error.to_string())])
    }

    pub fn unavailable(name: &str) -> Self {
        let p = Self::ok(name, "unreachable");
        p.available.store(false, Ordering::SeqCst);
        p
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = script.pop_front() {
            *last = Some(reply.clone());
            reply
        } else {
            last.clone().unwrap_or(Reply::Ok(String::new()))
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn ask(&self, prompt: &str) -> ProviderResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.next_reply() {
            Reply::Ok(content) => ProviderResponse::ok(&self.name, content, self.delay),
            Reply::Fail(error) => {
                ProviderResponse::classified_failure(&self.name, error, self.delay)
            }
        }
    }
}
