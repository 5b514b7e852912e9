pub mod error;
pub mod geochem;
pub mod keywords;
pub mod metadata;
pub mod normalizer;
pub mod passages;
pub mod prompt;
pub mod spatial;
pub mod standardize;
pub mod tabular;
pub mod textual;
pub mod triage;
pub mod types;

pub use error::ExpertError;
pub use geochem::{Conclusion, Evidence, EvidenceValue, GeochemExpert, GeochemFinding};
pub use metadata::{extract_metadata, DocumentMetadata};
pub use normalizer::EntityNormalizer;
pub use spatial::{GeometryKind, SpatialExpert, SpatialFeature, SpatialFinding};
pub use standardize::{Cell, ColumnType, StandardizedTable};
pub use tabular::{TabularExpert, TabularFinding};
pub use textual::{TextEntity, TextRelation, TextualExpert, TextualFinding};
pub use triage::{plan_tasks, required_experts, Librarian, TriageOutcome, TriageSettings};
pub use types::{
    AnalysisTask, ContentIndex, ContentUnit, ExpertKind, TaskKind, TriageSource, UnitKind,
};

use extract::ExtractionEngine;
use ingest::DocumentText;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertSettings {
    pub max_attempts: usize,
    /// Passages per spatial/geochemical run
    pub max_passages: usize,
    pub table_segment_chars: usize,
    pub max_table_segments: usize,
    pub textual_chunks: usize,
}

impl Default for ExpertSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_passages: 8,
            table_segment_chars: 3000,
            max_table_segments: 10,
            textual_chunks: 5,
        }
    }
}

/// Validated output of one expert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "expert", rename_all = "snake_case")]
pub enum ExpertFinding {
    Spatial(SpatialFinding),
    Geochemical(GeochemFinding),
    Tabular(TabularFinding),
    Textual(TextualFinding),
}

impl ExpertFinding {
    /// A finding with empty collections, standing in for a failed expert
    pub fn empty(kind: ExpertKind) -> Self {
        match kind {
            ExpertKind::Spatial => ExpertFinding::Spatial(SpatialFinding::default()),
            ExpertKind::Geochemical => ExpertFinding::Geochemical(GeochemFinding::default()),
            ExpertKind::Tabular => ExpertFinding::Tabular(TabularFinding::default()),
            ExpertKind::Textual => ExpertFinding::Textual(TextualFinding::default()),
        }
    }

    pub fn kind(&self) -> ExpertKind {
        match self {
            ExpertFinding::Spatial(_) => ExpertKind::Spatial,
            ExpertFinding::Geochemical(_) => ExpertKind::Geochemical,
            ExpertFinding::Tabular(_) => ExpertKind::Tabular,
            ExpertFinding::Textual(_) => ExpertKind::Textual,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ExpertFinding::Spatial(f) => f.features.is_empty(),
            ExpertFinding::Geochemical(f) => f.conclusions.is_empty(),
            ExpertFinding::Tabular(f) => f.tables.is_empty(),
            ExpertFinding::Textual(f) => f.entities.is_empty(),
        }
    }
}

/// Registry of the expert implementations, one per [`ExpertKind`].
///
/// Cheap to clone; every expert shares the one extraction engine.
#[derive(Clone)]
pub struct Experts {
    engine: ExtractionEngine,
    settings: ExpertSettings,
}

impl Experts {
    pub fn new(engine: ExtractionEngine, settings: ExpertSettings) -> Self {
        Self { engine, settings }
    }

    pub async fn analyze(
        &self,
        kind: ExpertKind,
        doc: &DocumentText,
        index: &ContentIndex,
        tasks: &[AnalysisTask],
    ) -> Result<ExpertFinding, ExpertError> {
        let engine = self.engine.clone();
        let settings = self.settings.clone();

        Ok(match kind {
            ExpertKind::Spatial => ExpertFinding::Spatial(
                SpatialExpert::new(engine, settings)
                    .analyze(doc, index, tasks)
                    .await?,
            ),
            ExpertKind::Geochemical => ExpertFinding::Geochemical(
                GeochemExpert::new(engine, settings)
                    .analyze(doc, index, tasks)
                    .await?,
            ),
            ExpertKind::Tabular => ExpertFinding::Tabular(
                TabularExpert::new(engine, settings)
                    .analyze(doc, index, tasks)
                    .await?,
            ),
            ExpertKind::Textual => ExpertFinding::Textual(
                TextualExpert::new(engine, settings)
                    .analyze(doc, index, tasks)
                    .await?,
            ),
        })
    }
}
