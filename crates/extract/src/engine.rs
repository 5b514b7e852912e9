use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::{cache_key, short, ContentCache};
use crate::error::{CompletionError, ParseError};
use crate::json::extract_json;
use crate::llm::{CompletionRequest, CompletionService, ContextItem};
use crate::prompt::build_feedback_prompt;
use crate::retry::RetryPolicy;
use crate::schema::{conform, Schema};

/// Prompt and context for one structured extraction. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    base_prompt: String,
    context: Vec<ContextItem>,
    key: String,
}

impl ExtractionRequest {
    pub fn new(base_prompt: impl Into<String>, context: Vec<ContextItem>) -> Self {
        let base_prompt = base_prompt.into();
        let key = cache_key(&base_prompt, &context);
        Self {
            base_prompt,
            context,
            key,
        }
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    pub fn context(&self) -> &[ContextItem] {
        &self.context
    }

    pub fn cache_key(&self) -> &str {
        &self.key
    }
}

/// Outcome of [`ExtractionEngine::extract`].
///
/// Running out of attempts is an ordinary outcome, not an error.
#[derive(Debug, Clone)]
pub enum ExtractionResult<S> {
    Success {
        value: S,
        /// Completion-service calls made; 0 for a cache hit
        attempts: usize,
        from_cache: bool,
    },
    Failed {
        attempts: usize,
        last_error: String,
    },
}

impl<S> ExtractionResult<S> {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success { .. })
    }

    pub fn attempts(&self) -> usize {
        match self {
            ExtractionResult::Success { attempts, .. } => *attempts,
            ExtractionResult::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn ok(self) -> Option<S> {
        match self {
            ExtractionResult::Success { value, .. } => Some(value),
            ExtractionResult::Failed { .. } => None,
        }
    }
}

/// The one path from a prompt to a schema-valid value.
///
/// Cheap to clone; clones share the completion service and cache.
#[derive(Clone)]
pub struct ExtractionEngine {
    service: Arc<dyn CompletionService>,
    cache: Option<Arc<ContentCache>>,
    retry: RetryPolicy,
}

impl ExtractionEngine {
    pub fn new(
        service: Arc<dyn CompletionService>,
        cache: Option<Arc<ContentCache>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service,
            cache,
            retry,
        }
    }

    pub fn cache(&self) -> Option<&Arc<ContentCache>> {
        self.cache.as_ref()
    }

    pub async fn extract<S: Schema>(
        &self,
        request: &ExtractionRequest,
        max_attempts: usize,
    ) -> ExtractionResult<S> {
        let key = request.cache_key();

        if let Some(value) = self.cached::<S>(key).await {
            return ExtractionResult::Success {
                value,
                attempts: 0,
                from_cache: true,
            };
        }

        let mut backoff = self.retry.backoff();
        let mut prompt = request.base_prompt().to_string();
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=max_attempts {
            info!(
                schema = S::NAME,
                service = self.service.name(),
                attempt,
                max_attempts,
                "Calling completion service"
            );

            let completion = CompletionRequest {
                prompt: prompt.clone(),
                context: request.context().to_vec(),
            };

            let raw = match self.service.complete(&completion).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(schema = S::NAME, attempt, error = %e, "Completion service call failed");
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let hint = match &e {
                            CompletionError::RateLimited { retry_after } => *retry_after,
                            _ => None,
                        };
                        let delay = backoff.next_delay(hint);
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
            };

            match Self::parse::<S>(&raw) {
                Ok(value) => {
                    info!(schema = S::NAME, attempt, "Extracted and validated structured data");
                    self.store(key, &value).await;
                    return ExtractionResult::Success {
                        value,
                        attempts: attempt,
                        from_cache: false,
                    };
                }
                Err(e) => {
                    warn!(schema = S::NAME, attempt, error = %e, "Response failed validation");
                    if attempt < max_attempts {
                        prompt = build_feedback_prompt(request.base_prompt(), &e);
                    }
                    last_error = e.to_string();
                }
            }
        }

        error!(
            schema = S::NAME,
            attempts = max_attempts,
            error = %last_error,
            "Failed to get valid structured data"
        );
        ExtractionResult::Failed {
            attempts: max_attempts,
            last_error,
        }
    }

    fn parse<S: Schema>(raw: &str) -> Result<S, ParseError> {
        let (value, strategy) = extract_json(raw)?;
        tracing::debug!(schema = S::NAME, strategy = strategy.name(), "Found JSON payload");
        conform::<S>(value)
    }

    /// A cached value that no longer fits the schema counts as a miss.
    async fn cached<S: Schema>(&self, key: &str) -> Option<S> {
        let cache = self.cache.as_ref()?;
        let value = cache.get(key).await?;

        match conform::<S>(value) {
            Ok(parsed) => {
                info!(schema = S::NAME, key = short(key), "Cache hit");
                Some(parsed)
            }
            Err(e) => {
                warn!(schema = S::NAME, key = short(key), error = %e, "Cached value is stale, re-fetching");
                None
            }
        }
    }

    async fn store<S: Schema>(&self, key: &str, value: &S) {
        let Some(cache) = &self.cache else {
            return;
        };

        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(schema = S::NAME, error = %e, "Could not serialize value for cache");
                return;
            }
        };

        if let Err(e) = cache.put(key, payload).await {
            warn!(schema = S::NAME, key = short(key), error = %e, "Cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Confidence;
    use crate::testing::ScriptedCompletion;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Assay {
        element: String,
        value: f64,
        #[serde(default)]
        confidence_score: Confidence,
    }

    impl Schema for Assay {
        const NAME: &'static str = "assay";

        fn validate(&self) -> Result<(), String> {
            if self.element.trim().is_empty() {
                return Err("element must not be empty".to_string());
            }
            self.confidence_score.check("confidence_score")
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct AssayV2 {
        element: String,
        value: f64,
        unit: String,
    }

    impl Schema for AssayV2 {
        const NAME: &'static str = "assay_v2";
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Notes {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        keywords: Vec<String>,
    }

    impl Schema for Notes {
        const NAME: &'static str = "notes";
    }

    fn engine(service: Arc<ScriptedCompletion>, cache: Option<Arc<ContentCache>>) -> ExtractionEngine {
        ExtractionEngine::new(service, cache, RetryPolicy::immediate())
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest::new(
            "Extract the assay.",
            vec![ContextItem::text("Sample AX-12 assayed 3.4 ppm Au")],
        )
    }

    #[tokio::test]
    async fn test_second_identical_call_is_served_from_cache() {
        let service = Arc::new(ScriptedCompletion::always(
            r#"{"element": "Au", "value": 3.4, "confidence_score": 0.9}"#,
        ));
        let cache = Arc::new(ContentCache::in_memory());
        let engine = engine(service.clone(), Some(cache));

        let first = engine.extract::<Assay>(&request(), 3).await;
        assert_eq!(service.call_count(), 1);

        let second = engine.extract::<Assay>(&request(), 3).await;
        assert_eq!(service.call_count(), 1);

        match (first, second) {
            (
                ExtractionResult::Success { value: a, from_cache: false, attempts: 1 },
                ExtractionResult::Success { value: b, from_cache: true, attempts: 0 },
            ) => assert_eq!(a, b),
            other => panic!("unexpected outcomes: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_payload_exhausts_exactly_max_attempts() {
        let service = Arc::new(ScriptedCompletion::always(r#"{"element": "Au"}"#));
        let engine = engine(service.clone(), Some(Arc::new(ContentCache::in_memory())));

        let result = engine.extract::<Assay>(&request(), 4).await;

        assert_eq!(service.call_count(), 4);
        match result {
            ExtractionResult::Failed { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("missing field `value`"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_feedback_carries_validation_error() {
        let service = Arc::new(ScriptedCompletion::sequence(vec![
            Ok("no json here".to_string()),
            Ok(r#"{"element": "Au", "value": 3.4, "confidence_score": 4.0}"#.to_string()),
            Ok(r#"{"element": "Au", "value": 3.4, "confidence_score": 0.8}"#.to_string()),
        ]));
        let engine = engine(service.clone(), None);

        let result = engine.extract::<Assay>(&request(), 3).await;
        assert!(result.is_success());
        assert_eq!(result.attempts(), 3);

        let prompts = service.prompts();
        assert_eq!(prompts[0], "Extract the assay.");
        assert!(prompts[1].contains("no JSON object found in the response"));
        assert!(prompts[2].contains("confidence_score must be between 0.0 and 1.0, got 4"));
        assert!(!prompts[2].contains("no JSON object found"));
    }

    #[tokio::test]
    async fn test_context_is_unchanged_across_retries() {
        let service = Arc::new(ScriptedCompletion::sequence(vec![
            Ok("{}".to_string()),
            Ok(r#"{"element": "Au", "value": 3.4}"#.to_string()),
        ]));
        let engine = engine(service.clone(), None);

        let result = engine.extract::<Assay>(&request(), 3).await;
        let value = result.ok().unwrap();
        assert_eq!(value.confidence_score, Confidence::UNKNOWN);

        let contexts = service.contexts();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0], contexts[1]);
    }

    #[tokio::test]
    async fn test_transport_error_retries_without_feedback() {
        let service = Arc::new(ScriptedCompletion::sequence(vec![
            Err(CompletionError::Transport("connection refused".to_string())),
            Ok(r#"```json
{"element": "Au", "value": 3.4}
```"#
                .to_string()),
        ]));
        let engine = engine(service.clone(), None);

        let result = engine.extract::<Assay>(&request(), 3).await;
        assert!(result.is_success());

        let prompts = service.prompts();
        assert_eq!(prompts[0], prompts[1]);
        assert!(!prompts[1].contains("FEEDBACK"));
    }

    #[tokio::test]
    async fn test_transport_errors_never_panic_or_raise() {
        let service = Arc::new(ScriptedCompletion::failing(CompletionError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }));
        let engine = engine(service.clone(), None);

        let result = engine.extract::<Assay>(&request(), 2).await;
        assert!(!result.is_success());
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_cache_entry_is_refetched() {
        let cache = Arc::new(ContentCache::in_memory());
        cache
            .put(request().cache_key(), json!({"element": "Au", "value": 3.4}))
            .await
            .unwrap();

        let service = Arc::new(ScriptedCompletion::always(
            r#"{"element": "Au", "value": 3.4, "unit": "ppm"}"#,
        ));
        let engine = engine(service.clone(), Some(cache.clone()));

        // The old entry lacks `unit`, so the evolved schema rejects it
        let result = engine.extract::<AssayV2>(&request(), 3).await;
        assert!(result.is_success());
        assert_eq!(service.call_count(), 1);
        assert_eq!(
            cache.get(request().cache_key()).await.unwrap()["unit"],
            json!("ppm")
        );
    }

    #[tokio::test]
    async fn test_zero_attempts_fails_without_calls() {
        let service = Arc::new(ScriptedCompletion::always("{}"));
        let engine = engine(service.clone(), None);

        let result = engine.extract::<Assay>(&request(), 0).await;
        assert!(!result.is_success());
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_envelope_without_json_is_never_a_success() {
        let service = Arc::new(ScriptedCompletion::always(
            r#"{"model": "llama3", "response": "I can't help with that.", "done": true}"#,
        ));
        let cache = Arc::new(ContentCache::in_memory());
        let engine = engine(service.clone(), Some(cache.clone()));

        let result = engine.extract::<Notes>(&request(), 2).await;

        match result {
            ExtractionResult::Failed { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, "no JSON object found in the response");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(cache.get(request().cache_key()).await.is_none());
    }
}
