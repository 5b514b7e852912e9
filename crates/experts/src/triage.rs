use extract::{
    Confidence, ContextItem, ExtractionEngine, ExtractionRequest, ExtractionResult, Schema,
};
use ingest::DocumentText;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::keywords::{self, contains_any};
use crate::prompt::build_triage_prompt;
use crate::types::{
    AnalysisTask, ContentIndex, ContentUnit, ExpertKind, TaskKind, TriageSource, UnitKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageSettings {
    /// Leading chunks sent to the model
    pub sample_chunks: usize,
    /// Leading chunks the heuristic classifier looks at
    pub heuristic_cap: usize,
    pub max_attempts: usize,
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            sample_chunks: 10,
            heuristic_cap: 20,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TriageReply {
    content_units: Vec<UnitReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnitReply {
    #[serde(default)]
    page_number: Option<usize>,
    #[serde(default)]
    content_type: UnitKind,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    confidence_score: Confidence,
}

impl Schema for TriageReply {
    const NAME: &'static str = "content_index";

    fn validate(&self) -> Result<(), String> {
        for (i, unit) in self.content_units.iter().enumerate() {
            unit.confidence_score
                .check(&format!("content_units[{}].confidence_score", i))?;
        }
        Ok(())
    }
}

/// Content index plus the task plan derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub index: ContentIndex,
    pub tasks: Vec<AnalysisTask>,
}

/// Classifies the opening of a document and plans the expert passes.
#[derive(Clone)]
pub struct Librarian {
    engine: ExtractionEngine,
    settings: TriageSettings,
}

impl Librarian {
    pub fn new(engine: ExtractionEngine, settings: TriageSettings) -> Self {
        Self { engine, settings }
    }

    /// Never fails: a failed or empty model classification falls back to
    /// the keyword heuristic.
    pub async fn triage(&self, doc: &DocumentText) -> TriageOutcome {
        let index = match self.classify(doc).await {
            Some(index) => index,
            None => heuristic_index(doc, self.settings.heuristic_cap),
        };
        let tasks = plan_tasks(&index);

        info!(
            source = ?index.source,
            units = index.units.len(),
            tasks = tasks.len(),
            "Triage complete"
        );

        TriageOutcome { index, tasks }
    }

    async fn classify(&self, doc: &DocumentText) -> Option<ContentIndex> {
        if doc.chunks.is_empty() {
            return None;
        }

        let sample_len = self.settings.sample_chunks.min(doc.chunks.len());
        let sample = doc.chunks[..sample_len].join("\n\n");
        let request = ExtractionRequest::new(build_triage_prompt(), vec![ContextItem::text(sample)]);

        let reply = match self
            .engine
            .extract::<TriageReply>(&request, self.settings.max_attempts)
            .await
        {
            ExtractionResult::Success { value, .. } => value,
            ExtractionResult::Failed { attempts, last_error } => {
                warn!(attempts, error = %last_error, "Model triage failed, using heuristic classifier");
                return None;
            }
        };

        if reply.content_units.is_empty() {
            warn!("Model triage found no content units, using heuristic classifier");
            return None;
        }

        let units = reply
            .content_units
            .into_iter()
            .enumerate()
            .map(|(i, unit)| ContentUnit {
                unit_id: format!("unit_{}", i + 1),
                location: unit
                    .page_number
                    .filter(|p| (1..=sample_len).contains(p))
                    .unwrap_or(i.min(sample_len - 1) + 1),
                kind: unit.content_type,
                title: unit.title,
                description: unit.description,
                keywords: unit.keywords,
                confidence: unit.confidence_score,
            })
            .collect();

        Some(ContentIndex {
            document_name: doc.stem(),
            total_chunks: doc.chunks.len(),
            units,
            source: TriageSource::Model,
        })
    }
}

/// Deterministic keyword classifier over the first `cap` chunks.
pub fn heuristic_index(doc: &DocumentText, cap: usize) -> ContentIndex {
    let units = doc
        .chunks
        .iter()
        .take(cap)
        .enumerate()
        .map(|(i, chunk)| classify_chunk(i + 1, chunk))
        .collect();

    ContentIndex {
        document_name: doc.stem(),
        total_chunks: doc.chunks.len(),
        units,
        source: TriageSource::Heuristic,
    }
}

fn classify_chunk(location: usize, chunk: &str) -> ContentUnit {
    let lower = chunk.to_lowercase();
    let mut kind = UnitKind::Text;
    let mut tags = Vec::new();

    if contains_any(&lower, keywords::MAP_TERMS) {
        kind = UnitKind::Map;
        tags.push("geological_map");
    } else if contains_any(&lower, keywords::FIGURE_TERMS) {
        kind = UnitKind::Figure;
        tags.push("figure");
    }

    if contains_any(&lower, keywords::TABLE_TERMS) {
        if kind == UnitKind::Text {
            kind = UnitKind::Table;
        }
        tags.push("data_table");
    }

    if keywords::has_geochem_signal(chunk) {
        tags.push("geochemistry");
    }

    if contains_any(&lower, keywords::SPATIAL_TERMS) {
        tags.push("spatial_reference");
    }

    ContentUnit {
        unit_id: format!("unit_{}", location),
        location,
        kind,
        title: Some(format!("Paragraph {}", location)),
        description: preview(chunk, 200),
        keywords: tags.into_iter().map(String::from).collect(),
        confidence: Confidence::new(0.6),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Derive prioritized tasks from an index. At most one task per kind.
pub fn plan_tasks(index: &ContentIndex) -> Vec<AnalysisTask> {
    let mut tasks = Vec::new();

    let plan: [(TaskKind, u8, &str, fn(&ContentUnit) -> bool); 4] = [
        (
            TaskKind::Spatial,
            1,
            "Extract spatial features (occurrences, faults, lithological units) with their coordinates",
            |u| {
                matches!(u.kind, UnitKind::Figure | UnitKind::Map)
                    || u.mentions(&["map", "spatial", "location", "coordinate"])
            },
        ),
        (
            TaskKind::Tabular,
            2,
            "Extract data tables and standardize them into typed columns",
            |u| u.kind == UnitKind::Table || u.mentions(&["data_table", "table"]),
        ),
        (
            TaskKind::Geochemical,
            3,
            "Extract geochemical conclusions together with their quantitative evidence",
            |u| u.mentions(&["geochem", "chemical", "composition", "assay", "ppm"]),
        ),
        (
            TaskKind::TextualSynthesis,
            4,
            "Extract entities and relationships from the remaining descriptive text",
            |u| u.kind == UnitKind::Text && !u.keywords.is_empty(),
        ),
    ];

    for (kind, priority, instructions, selects) in plan {
        let units: Vec<&ContentUnit> = index.units.iter().filter(|u| selects(u)).collect();
        if units.is_empty() {
            continue;
        }

        tasks.push(AnalysisTask {
            task_id: format!("task_{:03}", tasks.len() + 1),
            kind,
            target: kind.target(),
            priority,
            unit_ids: units.iter().map(|u| u.unit_id.clone()).collect(),
            locations: units.iter().map(|u| u.location).collect(),
            instructions: instructions.to_string(),
        });
    }

    tasks
}

/// Distinct experts the plan asks for, in registry order
pub fn required_experts(tasks: &[AnalysisTask]) -> Vec<ExpertKind> {
    ExpertKind::ALL
        .into_iter()
        .filter(|kind| tasks.iter().any(|t| t.target == *kind))
        .collect()
}
