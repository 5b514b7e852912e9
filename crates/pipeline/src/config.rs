use experts::{ExpertSettings, TriageSettings};
use extract::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: OperationMode,
    pub completion: CompletionConfig,
    pub extraction: ExtractionConfig,
    pub cache: CacheConfig,
    pub concurrency: ConcurrencyConfig,
    pub triage: TriageConfig,
    pub experts: ExpertConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // Fewer attempts and passages, cache on
    Accurate,  // Always fresh, more attempts
    Balanced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    /// Falls back to `GEMINI_API_KEY` when absent
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub expert_timeout_secs: u64,
    pub max_concurrent_experts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub sample_chunks: usize,
    pub heuristic_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpertConfig {
    pub max_passages: usize,
    pub table_segment_chars: usize,
    pub max_table_segments: usize,
    pub textual_chunks: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

impl CompletionConfig {
    pub fn gemini() -> Self {
        Self {
            provider: Provider::Gemini,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: None,
            request_timeout_secs: 120,
        }
    }

    /// Configured key, else the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(GEMINI_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".cache/extractions"),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            expert_timeout_secs: 300,
            max_concurrent_experts: 4,
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            sample_chunks: 10,
            heuristic_cap: 20,
        }
    }
}

impl Default for ExpertConfig {
    fn default() -> Self {
        Self {
            max_passages: 8,
            table_segment_chars: 3000,
            max_table_segments: 10,
            textual_chunks: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            completion: CompletionConfig::default(),
            extraction: ExtractionConfig::default(),
            cache: CacheConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            triage: TriageConfig::default(),
            experts: ExpertConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn fast_mode() -> Self {
        Self {
            mode: OperationMode::Fast,
            extraction: ExtractionConfig {
                max_attempts: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            concurrency: ConcurrencyConfig {
                expert_timeout_secs: 120,
                max_concurrent_experts: 4,
            },
            triage: TriageConfig {
                sample_chunks: 5,
                heuristic_cap: 10,
            },
            experts: ExpertConfig {
                max_passages: 4,
                max_table_segments: 5,
                textual_chunks: 3,
                ..ExpertConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn accurate_mode() -> Self {
        Self {
            mode: OperationMode::Accurate,
            extraction: ExtractionConfig {
                max_attempts: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            cache: CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
            concurrency: ConcurrencyConfig {
                expert_timeout_secs: 600,
                max_concurrent_experts: 2,
            },
            experts: ExpertConfig {
                max_passages: 12,
                max_table_segments: 20,
                ..ExpertConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn for_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Accurate => Self::accurate_mode(),
            OperationMode::Balanced => Self::default(),
        }
    }

    /// Load a JSON config; missing sections take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.check().map_err(|message| PipelineError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), String> {
        if self.extraction.max_attempts == 0 {
            return Err("extraction.max_attempts must be at least 1".to_string());
        }
        if self.concurrency.max_concurrent_experts == 0 {
            return Err("concurrency.max_concurrent_experts must be at least 1".to_string());
        }
        if self.concurrency.expert_timeout_secs == 0 {
            return Err("concurrency.expert_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.extraction.initial_backoff_ms, self.extraction.max_backoff_ms)
    }

    pub fn expert_timeout(&self) -> Duration {
        Duration::from_secs(self.concurrency.expert_timeout_secs)
    }

    pub fn triage_settings(&self) -> TriageSettings {
        TriageSettings {
            sample_chunks: self.triage.sample_chunks,
            heuristic_cap: self.triage.heuristic_cap,
            max_attempts: self.extraction.max_attempts,
        }
    }

    pub fn expert_settings(&self) -> ExpertSettings {
        ExpertSettings {
            max_attempts: self.extraction.max_attempts,
            max_passages: self.experts.max_passages,
            table_segment_chars: self.experts.table_segment_chars,
            max_table_segments: self.experts.max_table_segments,
            textual_chunks: self.experts.textual_chunks,
        }
    }
}
