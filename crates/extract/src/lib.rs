pub mod cache;
pub mod engine;
pub mod error;
pub mod json;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod schema;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{cache_key, ContentCache};
pub use engine::{ExtractionEngine, ExtractionRequest, ExtractionResult};
pub use error::{CacheError, CompletionError, ParseError};
pub use json::{extract_json, ParseStrategy};
pub use llm::{CompletionRequest, CompletionService, ContextItem, GeminiClient, OllamaClient};
pub use retry::RetryPolicy;
pub use schema::{conform, Confidence, Schema};
