use extract::CacheError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The only failure that aborts a run: there is no text to work on
    #[error("document unavailable: {path:?}")]
    DocumentUnavailable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("pipeline run cancelled")]
    Cancelled,

    #[error("invalid configuration in {path:?}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("gemini provider needs an API key (config or GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("cannot open extraction cache: {0}")]
    Cache(#[from] CacheError),
}
