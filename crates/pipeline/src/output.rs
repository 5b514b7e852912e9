use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use synthesis::SynthesizedKnowledge;
use tracing::info;

/// Files written for one document.
#[derive(Debug, Clone, Serialize)]
pub struct SavedResults {
    pub knowledge_path: PathBuf,
    pub records_path: PathBuf,
}

/// Output file stem for a source name: its file stem, else the knowledge id.
pub fn output_stem(knowledge: &SynthesizedKnowledge) -> String {
    Path::new(&knowledge.source_document)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| knowledge.knowledge_id.clone())
}

/// Write `<stem>_knowledge.json` and `<stem>_records.json` under `dir`.
pub async fn save_results(knowledge: &SynthesizedKnowledge, dir: &Path) -> Result<SavedResults> {
    tokio::fs::create_dir_all(dir)
        .await
        .context(format!("Failed to create output directory: {:?}", dir))?;

    let stem = output_stem(knowledge);
    let knowledge_path = dir.join(format!("{}_knowledge.json", stem));
    let records_path = dir.join(format!("{}_records.json", stem));

    let knowledge_json = serde_json::to_string_pretty(knowledge)?;
    tokio::fs::write(&knowledge_path, knowledge_json)
        .await
        .context(format!("Failed to write {:?}", knowledge_path))?;

    let records_json = serde_json::to_string_pretty(&knowledge.records)?;
    tokio::fs::write(&records_path, records_json)
        .await
        .context(format!("Failed to write {:?}", records_path))?;

    info!(
        knowledge = %knowledge_path.display(),
        records = knowledge.records.len(),
        "Results saved"
    );

    Ok(SavedResults {
        knowledge_path,
        records_path,
    })
}
