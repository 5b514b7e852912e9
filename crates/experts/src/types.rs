use extract::Confidence;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of specialized extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertKind {
    Spatial,
    Geochemical,
    Tabular,
    Textual,
}

impl ExpertKind {
    pub const ALL: [ExpertKind; 4] = [
        ExpertKind::Spatial,
        ExpertKind::Geochemical,
        ExpertKind::Tabular,
        ExpertKind::Textual,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExpertKind::Spatial => "spatial",
            ExpertKind::Geochemical => "geochemical",
            ExpertKind::Tabular => "tabular",
            ExpertKind::Textual => "textual",
        }
    }
}

impl fmt::Display for ExpertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Figure,
    Table,
    Map,
    #[default]
    #[serde(other)]
    Text,
}

/// One classified fragment of the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUnit {
    pub unit_id: String,
    /// 1-based paragraph (chunk) number
    pub location: usize,
    pub kind: UnitKind,
    pub title: Option<String>,
    pub description: String,
    pub keywords: Vec<String>,
    pub confidence: Confidence,
}

impl ContentUnit {
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword))
    }

    /// True when any keyword or the description mentions one of `terms`
    pub fn mentions(&self, terms: &[&str]) -> bool {
        let description = self.description.to_lowercase();
        terms.iter().any(|term| {
            description.contains(term)
                || self
                    .keywords
                    .iter()
                    .any(|k| k.to_lowercase().contains(term))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentIndex {
    pub document_name: String,
    pub total_chunks: usize,
    pub units: Vec<ContentUnit>,
    pub source: TriageSource,
}

impl ContentIndex {
    pub fn unit(&self, unit_id: &str) -> Option<&ContentUnit> {
        self.units.iter().find(|u| u.unit_id == unit_id)
    }

    /// Units referenced by any of `tasks`, in index order
    pub fn units_for<'a>(&'a self, tasks: &[AnalysisTask]) -> Vec<&'a ContentUnit> {
        self.units
            .iter()
            .filter(|u| tasks.iter().any(|t| t.unit_ids.contains(&u.unit_id)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Spatial,
    Geochemical,
    Tabular,
    TextualSynthesis,
}

impl TaskKind {
    pub fn target(&self) -> ExpertKind {
        match self {
            TaskKind::Spatial => ExpertKind::Spatial,
            TaskKind::Geochemical => ExpertKind::Geochemical,
            TaskKind::Tabular => ExpertKind::Tabular,
            TaskKind::TextualSynthesis => ExpertKind::Textual,
        }
    }
}

/// A planned unit of work for one expert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub task_id: String,
    pub kind: TaskKind,
    pub target: ExpertKind,
    /// 1 is most urgent
    pub priority: u8,
    pub unit_ids: Vec<String>,
    pub locations: Vec<usize>,
    pub instructions: String,
}
