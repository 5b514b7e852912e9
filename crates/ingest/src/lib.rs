pub mod chunker;
pub mod reader;

pub use chunker::{Chunker, ChunkerConfig};
pub use reader::FileReader;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// Text of one source document, as handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentText {
    pub doc_id: String,
    /// File name or caller-supplied label
    pub source: String,
    pub full_text: String,
    /// Paragraph-level chunks, in document order
    pub chunks: Vec<String>,
}

impl DocumentText {
    pub fn from_text(source: &str, full_text: String) -> Self {
        let chunker = Chunker::new(ChunkerConfig::default());
        let chunks = chunker.chunk_text(&full_text);

        Self {
            doc_id: generate_doc_id(source),
            source: source.to_string(),
            full_text,
            chunks,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.full_text.trim().is_empty()
    }

    /// File stem of the source, used to name output files
    pub fn stem(&self) -> String {
        Path::new(&self.source)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.doc_id.clone())
    }
}

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Read and chunk a single file
pub async fn ingest_file(file_path: &Path) -> Result<DocumentText> {
    let content = FileReader::read_file(file_path).await?;
    let source = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string_lossy().to_string());

    let document = DocumentText::from_text(&source, content);
    info!(
        source = %document.source,
        chars = document.full_text.len(),
        chunks = document.chunks.len(),
        "Document ingested"
    );

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_is_stable() {
        assert_eq!(generate_doc_id("report.txt"), generate_doc_id("report.txt"));
        assert_ne!(generate_doc_id("report.txt"), generate_doc_id("other.txt"));
        assert_eq!(generate_doc_id("report.txt").len(), 32);
    }

    #[test]
    fn test_stem() {
        let doc = DocumentText::from_text("reports/zeta_2019.md", "Some text here.".to_string());
        assert_eq!(doc.stem(), "zeta_2019");
    }

    #[tokio::test]
    async fn test_ingest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeta.txt");
        std::fs::write(
            &path,
            "Geological setting of the Zeta prospect.\n\nSample AX-12 assayed 3.4 ppm Au near Location Zeta",
        )
        .unwrap();

        let doc = ingest_file(&path).await.unwrap();
        assert_eq!(doc.source, "zeta.txt");
        assert_eq!(doc.chunks.len(), 2);
        assert!(!doc.is_blank());
    }
}
