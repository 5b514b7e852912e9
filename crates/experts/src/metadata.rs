use extract::{Confidence, ContextItem, ExtractionEngine, ExtractionRequest, ExtractionResult, Schema};
use ingest::DocumentText;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::prompt::build_metadata_prompt;

/// Bibliographic metadata read from the opening of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub confidence_score: Confidence,
}

impl Schema for DocumentMetadata {
    const NAME: &'static str = "document_metadata";

    fn validate(&self) -> Result<(), String> {
        if let Some(year) = self.publication_year {
            if !(1000..=9999).contains(&year) {
                return Err(format!("publication_year must be a four-digit year, got {}", year));
            }
        }
        self.confidence_score.check("confidence_score")
    }
}

/// Metadata from the first chunk, or `None` when there is nothing to read
/// or the extraction fails.
pub async fn extract_metadata(
    engine: &ExtractionEngine,
    doc: &DocumentText,
    max_attempts: usize,
) -> Option<DocumentMetadata> {
    let first = doc.chunks.first()?;
    let request = ExtractionRequest::new(build_metadata_prompt(), vec![ContextItem::text(first.clone())]);

    match engine.extract::<DocumentMetadata>(&request, max_attempts).await {
        ExtractionResult::Success { value, .. } => Some(value),
        ExtractionResult::Failed { attempts, last_error } => {
            warn!(attempts, error = %last_error, "Metadata extraction failed");
            None
        }
    }
}
