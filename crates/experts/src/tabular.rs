use extract::{Confidence, ExtractionEngine, Schema};
use ingest::DocumentText;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::ExpertError;
use crate::keywords::has_table_signal;
use crate::passages::{extract_each, Passage};
use crate::prompt::build_table_prompt;
use crate::standardize::{standardize_table, RawTable, StandardizedTable};
use crate::types::{AnalysisTask, ContentIndex, ExpertKind};
use crate::ExpertSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableReply {
    extracted_tables: Vec<TableEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableEntry {
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    columns: Vec<Value>,
    #[serde(default)]
    data: Vec<RowEntry>,
    #[serde(default)]
    confidence_score: Confidence,
    #[serde(default)]
    raw_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RowEntry {
    row_data: Map<String, Value>,
}

impl Schema for TableReply {
    const NAME: &'static str = "table_extraction";

    fn validate(&self) -> Result<(), String> {
        for (i, table) in self.extracted_tables.iter().enumerate() {
            table
                .confidence_score
                .check(&format!("extracted_tables[{}].confidence_score", i))?;
        }
        Ok(())
    }
}

impl From<TableEntry> for RawTable {
    fn from(entry: TableEntry) -> Self {
        RawTable {
            table_name: entry.table_name,
            columns: entry
                .columns
                .into_iter()
                .map(|c| match c {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            rows: entry.data.into_iter().map(|r| r.row_data).collect(),
            raw_text: entry.raw_text.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabularFinding {
    pub tables: Vec<StandardizedTable>,
    pub segments_analyzed: usize,
    /// Raw tables dropped for having no columns or rows
    pub tables_dropped: usize,
    /// Mean overall quality across tables; 0 when there are none
    pub overall_quality: f64,
}

pub struct TabularExpert {
    engine: ExtractionEngine,
    settings: ExpertSettings,
}

impl TabularExpert {
    pub fn new(engine: ExtractionEngine, settings: ExpertSettings) -> Self {
        Self { engine, settings }
    }

    pub async fn analyze(
        &self,
        doc: &DocumentText,
        _index: &ContentIndex,
        _tasks: &[AnalysisTask],
    ) -> Result<TabularFinding, ExpertError> {
        let segments: Vec<Passage> = split_for_tables(
            &doc.full_text,
            self.settings.table_segment_chars,
            self.settings.max_table_segments,
        )
        .into_iter()
        .enumerate()
        .map(|(index, text)| Passage { index, text })
        .collect();
        info!(segments = segments.len(), "Tabular expert starting");

        let replies = extract_each::<TableReply>(
            &self.engine,
            ExpertKind::Tabular,
            &build_table_prompt(),
            &segments,
            self.settings.max_attempts,
        )
        .await?;

        let mut tables = Vec::new();
        let mut dropped = 0;
        for (_, reply) in replies {
            for entry in reply.extracted_tables {
                let table_id = format!("table_{}", tables.len() + dropped + 1);
                match standardize_table(&RawTable::from(entry), &table_id) {
                    Some(table) => tables.push(table),
                    None => {
                        warn!(table_id = %table_id, "Dropping table without columns or rows");
                        dropped += 1;
                    }
                }
            }
        }

        let overall_quality = if tables.is_empty() {
            0.0
        } else {
            tables.iter().map(|t| t.quality.overall).sum::<f64>() / tables.len() as f64
        };
        info!(tables = tables.len(), overall_quality, "Tabular expert finished");

        Ok(TabularFinding {
            tables,
            segments_analyzed: segments.len(),
            tables_dropped: dropped,
            overall_quality,
        })
    }
}

/// Split text into segments of under `max_chars` bytes for table extraction.
///
/// Paragraphs that look table-like get a segment of their own (split by line
/// when oversized); other paragraphs are packed together.
pub fn split_for_tables(full_text: &str, max_chars: usize, max_segments: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for paragraph in full_text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        if has_table_signal(paragraph) {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }

            if paragraph.len() > max_chars {
                let mut piece = String::new();
                for line in paragraph.lines() {
                    if !piece.is_empty() && piece.len() + line.len() >= max_chars {
                        segments.push(std::mem::take(&mut piece));
                    }
                    piece.push_str(line);
                    piece.push('\n');
                }
                if !piece.is_empty() {
                    segments.push(piece);
                }
            } else {
                segments.push(paragraph.to_string());
            }
        } else {
            if !current.is_empty() && current.len() + paragraph.len() >= max_chars {
                segments.push(std::mem::take(&mut current));
            }
            current.push_str(paragraph);
            current.push_str("\n\n");
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments.truncate(max_segments);
    segments
}
