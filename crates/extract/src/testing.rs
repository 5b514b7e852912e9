//! Scripted completion service for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::CompletionError;
use crate::llm::{CompletionRequest, CompletionService, ContextItem};

struct Rule {
    marker: String,
    reply: Result<String, CompletionError>,
    delay: Duration,
}

/// Replies chosen by prompt marker, then by queue, then a fallback.
///
/// Every call is recorded so tests can count calls and inspect prompts.
pub struct ScriptedCompletion {
    rules: Vec<Rule>,
    queue: Mutex<VecDeque<Result<String, CompletionError>>>,
    fallback: Result<String, CompletionError>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    /// Fails every call that no rule matches
    pub fn new() -> Self {
        Self::failing(CompletionError::Transport("no scripted reply".to_string()))
    }

    pub fn always(reply: impl Into<String>) -> Self {
        Self::with_fallback(Ok(reply.into()))
    }

    pub fn failing(error: CompletionError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// Replies in order; once drained, calls fail with a transport error.
    pub fn sequence(replies: Vec<Result<String, CompletionError>>) -> Self {
        let scripted = Self::new();
        *scripted.queue.lock().unwrap() = replies.into();
        scripted
    }

    fn with_fallback(fallback: Result<String, CompletionError>) -> Self {
        Self {
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `reply` whenever the prompt or a text context item contains `marker`.
    pub fn when(self, marker: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rule(marker, Ok(reply.into()), Duration::ZERO)
    }

    pub fn when_error(self, marker: impl Into<String>, error: CompletionError) -> Self {
        self.rule(marker, Err(error), Duration::ZERO)
    }

    /// Like [`when`](Self::when) but sleeps first.
    pub fn when_slow(
        self,
        marker: impl Into<String>,
        reply: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.rule(marker, Ok(reply.into()), delay)
    }

    fn rule(
        mut self,
        marker: impl Into<String>,
        reply: Result<String, CompletionError>,
        delay: Duration,
    ) -> Self {
        self.rules.push(Rule {
            marker: marker.into(),
            reply,
            delay,
        });
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.prompt.clone())
            .collect()
    }

    pub fn contexts(&self) -> Vec<Vec<ContextItem>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.context.clone())
            .collect()
    }

    /// Calls whose prompt or context mentions `marker`
    pub fn calls_matching(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| mentions(c, marker))
            .count()
    }
}

fn mentions(request: &CompletionRequest, marker: &str) -> bool {
    request.prompt.contains(marker)
        || request.context.iter().any(|item| match item {
            ContextItem::Text(text) => text.contains(marker),
            ContextItem::File { name, .. } => name.contains(marker),
        })
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(rule) = self.rules.iter().find(|r| mentions(request, &r.marker)) {
            if !rule.delay.is_zero() {
                tokio::time::sleep(rule.delay).await;
            }
            return rule.reply.clone();
        }

        let queued = self.queue.lock().unwrap().pop_front();
        match queued {
            Some(reply) => reply,
            None => self.fallback.clone(),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
