use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ingest::FileReader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::orchestrator::Orchestrator;
use crate::output::save_results;

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file: PathBuf,
    pub succeeded: bool,
    pub knowledge_id: Option<String>,
    pub overall_confidence: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub files: Vec<FileOutcome>,
}

/// Run every `.txt`/`.md` file in `input_dir` in turn, saving each result
/// and a `batch_report.json` under `output_dir`.
///
/// A file that cannot be read or saved is recorded as failed and the batch
/// moves on.
pub async fn run_batch(
    orchestrator: &Orchestrator,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<BatchReport> {
    let started_at = Utc::now();
    let files = FileReader::list_directory(input_dir).await?;
    info!(files = files.len(), dir = %input_dir.display(), "Batch starting");

    let mut outcomes = Vec::with_capacity(files.len());
    for (i, file) in files.iter().enumerate() {
        info!(file = %file.display(), progress = format!("{}/{}", i + 1, files.len()), "Batch file");

        let result = match orchestrator.run_file(file).await {
            Ok(knowledge) => save_results(&knowledge, output_dir)
                .await
                .map(|_| knowledge),
            Err(e) => Err(anyhow::Error::new(e)),
        };

        outcomes.push(match result {
            Ok(knowledge) => FileOutcome {
                file: file.clone(),
                succeeded: true,
                knowledge_id: Some(knowledge.knowledge_id),
                overall_confidence: Some(knowledge.overall_confidence),
                error: None,
            },
            Err(e) => {
                error!(file = %file.display(), error = %format!("{:#}", e), "Batch file failed");
                FileOutcome {
                    file: file.clone(),
                    succeeded: false,
                    knowledge_id: None,
                    overall_confidence: None,
                    error: Some(format!("{:#}", e)),
                }
            }
        });
    }

    let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
    let total_files = outcomes.len();
    let report = BatchReport {
        started_at,
        finished_at: Utc::now(),
        total_files,
        succeeded,
        failed: total_files - succeeded,
        success_rate: if total_files == 0 {
            0.0
        } else {
            succeeded as f64 / total_files as f64
        },
        files: outcomes,
    };

    tokio::fs::create_dir_all(output_dir)
        .await
        .context(format!("Failed to create output directory: {:?}", output_dir))?;
    let report_path = output_dir.join("batch_report.json");
    tokio::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .await
        .context(format!("Failed to write {:?}", report_path))?;

    info!(
        total = report.total_files,
        succeeded = report.succeeded,
        failed = report.failed,
        "Batch complete"
    );
    Ok(report)
}
