pub mod graph;
pub mod records;
pub mod validation;

#[cfg(test)]
mod fixtures;

pub use graph::{build_graph, GraphEdge, GraphNode, KnowledgeGraph, NodeType};
pub use records::{map_records, ForeignKey, PersistenceRecord, RecordTable};
pub use validation::{ValidationReport, ValidationResult};

use chrono::{DateTime, Utc};
use experts::{
    AnalysisTask, ContentIndex, DocumentMetadata, ExpertFinding, ExpertKind, GeochemFinding,
    SpatialFinding, TabularFinding, TextualFinding, TriageOutcome, TriageSource,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertStatus {
    Succeeded,
    /// Ran to completion without finding anything
    Empty,
    Failed,
    TimedOut,
    NotRequested,
}

/// How one expert's Phase 2 run ended.
#[derive(Debug, Clone, Serialize)]
pub struct ExpertRun {
    pub expert: ExpertKind,
    pub status: ExpertStatus,
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl ExpertRun {
    pub fn not_requested(expert: ExpertKind) -> Self {
        Self {
            expert,
            status: ExpertStatus::NotRequested,
            detail: None,
            elapsed_ms: 0,
        }
    }
}

/// Everything Phase 3 consumes.
pub struct SynthesisInput {
    pub source_document: String,
    pub triage: TriageOutcome,
    pub findings: Vec<ExpertFinding>,
    pub runs: Vec<ExpertRun>,
    pub metadata: Option<DocumentMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingSummary {
    pub tasks_planned: usize,
    pub content_units: usize,
    pub spatial_features: usize,
    pub geochemical_conclusions: usize,
    pub evidence_entries: usize,
    pub tables: usize,
    pub text_entities: usize,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub records: usize,
    pub validation_passed: bool,
    pub overall_confidence: f64,
}

/// Root output of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedKnowledge {
    pub knowledge_id: String,
    pub source_document: String,
    pub synthesized_at: DateTime<Utc>,
    pub triage_source: TriageSource,
    pub content_index: ContentIndex,
    pub tasks: Vec<AnalysisTask>,
    pub expert_runs: Vec<ExpertRun>,
    pub spatial: SpatialFinding,
    pub geochemical: GeochemFinding,
    pub tabular: TabularFinding,
    pub textual: TextualFinding,
    pub metadata: Option<DocumentMetadata>,
    pub knowledge_graph: KnowledgeGraph,
    pub validation: ValidationReport,
    pub records: Vec<PersistenceRecord>,
    pub overall_confidence: f64,
    pub summary: ProcessingSummary,
}

impl SynthesizedKnowledge {
    pub fn run_for(&self, expert: ExpertKind) -> Option<&ExpertRun> {
        self.expert_runs.iter().find(|r| r.expert == expert)
    }
}

/// Fuses expert findings, cross-validates them and maps them to records.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(&self, input: SynthesisInput) -> SynthesizedKnowledge {
        let SynthesisInput {
            source_document,
            triage,
            findings,
            runs,
            metadata,
        } = input;

        let mut spatial = SpatialFinding::default();
        let mut geochemical = GeochemFinding::default();
        let mut tabular = TabularFinding::default();
        let mut textual = TextualFinding::default();
        for finding in findings {
            match finding {
                ExpertFinding::Spatial(f) => spatial = f,
                ExpertFinding::Geochemical(f) => geochemical = f,
                ExpertFinding::Tabular(f) => tabular = f,
                ExpertFinding::Textual(f) => textual = f,
            }
        }

        let knowledge_graph = build_graph(&spatial, &geochemical, &tabular, &textual);
        let validation = ValidationReport::run(&spatial, &geochemical, &tabular);
        for (check, result) in validation.checks() {
            info!(
                check,
                is_valid = result.is_valid,
                confidence = result.confidence_score,
                issues = result.issues.len(),
                "Validation check"
            );
        }

        let records = map_records(&source_document, &spatial, &geochemical, &tabular, &knowledge_graph);
        let overall_confidence = validation.overall_confidence();

        let summary = ProcessingSummary {
            tasks_planned: triage.tasks.len(),
            content_units: triage.index.units.len(),
            spatial_features: spatial.features.len(),
            geochemical_conclusions: geochemical.conclusions.len(),
            evidence_entries: geochemical.evidence_count(),
            tables: tabular.tables.len(),
            text_entities: textual.entities.len(),
            graph_nodes: knowledge_graph.nodes.len(),
            graph_edges: knowledge_graph.edges.len(),
            records: records.len(),
            validation_passed: validation.all_valid(),
            overall_confidence,
        };

        info!(
            nodes = summary.graph_nodes,
            edges = summary.graph_edges,
            records = summary.records,
            overall_confidence,
            "Synthesis complete"
        );

        SynthesizedKnowledge {
            knowledge_id: Uuid::new_v4().to_string(),
            source_document,
            synthesized_at: Utc::now(),
            triage_source: triage.index.source,
            content_index: triage.index,
            tasks: triage.tasks,
            expert_runs: runs,
            spatial,
            geochemical,
            tabular,
            textual,
            metadata,
            knowledge_graph,
            validation,
            records,
            overall_confidence,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{assay_table, conclusion, evidence, feature};
    use experts::EvidenceValue;

    fn empty_triage() -> TriageOutcome {
        TriageOutcome {
            index: ContentIndex {
                document_name: "empty.txt".to_string(),
                total_chunks: 0,
                units: Vec::new(),
                source: TriageSource::Heuristic,
            },
            tasks: Vec::new(),
        }
    }

    #[test]
    fn test_empty_input_yields_zero_confidence() {
        let knowledge = Synthesizer::new().synthesize(SynthesisInput {
            source_document: "empty.txt".to_string(),
            triage: empty_triage(),
            findings: Vec::new(),
            runs: ExpertKind::ALL.iter().map(|&k| ExpertRun::not_requested(k)).collect(),
            metadata: None,
        });

        assert_eq!(knowledge.overall_confidence, 0.0);
        assert!(knowledge.records.is_empty());
        assert!(knowledge.knowledge_graph.nodes.is_empty());
        assert!(!knowledge.summary.validation_passed);
        assert_eq!(
            knowledge.run_for(ExpertKind::Spatial).unwrap().status,
            ExpertStatus::NotRequested
        );
    }

    #[test]
    fn test_full_findings_fused() {
        let mut granite = conclusion("passage_1_conclusion_1", "Zeta granite", "peraluminous");
        granite.evidence.push(evidence("Au", EvidenceValue::Number(3.4)));

        let knowledge = Synthesizer::new().synthesize(SynthesisInput {
            source_document: "zeta.txt".to_string(),
            triage: empty_triage(),
            findings: vec![
                ExpertFinding::Spatial(SpatialFinding {
                    features: vec![feature("feature_1", "Location Zeta", Some(vec![[-7.1, 30.2]]))],
                    ..SpatialFinding::default()
                }),
                ExpertFinding::Geochemical(GeochemFinding {
                    conclusions: vec![granite],
                    ..GeochemFinding::default()
                }),
                ExpertFinding::Tabular(TabularFinding {
                    tables: vec![assay_table("table_1")],
                    ..TabularFinding::default()
                }),
            ],
            runs: Vec::new(),
            metadata: None,
        });

        assert!(knowledge.validation.all_valid());
        assert_eq!(knowledge.overall_confidence, 1.0);
        assert_eq!(knowledge.summary.graph_nodes, 3);
        assert_eq!(knowledge.summary.graph_edges, 1);
        // location, finding, evidence, dataset
        assert_eq!(knowledge.summary.records, 4);
        assert!(Uuid::parse_str(&knowledge.knowledge_id).is_ok());
    }

    #[test]
    fn test_knowledge_serializes() {
        let knowledge = Synthesizer::new().synthesize(SynthesisInput {
            source_document: "empty.txt".to_string(),
            triage: empty_triage(),
            findings: vec![ExpertFinding::empty(ExpertKind::Tabular)],
            runs: Vec::new(),
            metadata: None,
        });

        let value = serde_json::to_value(&knowledge).unwrap();
        assert_eq!(value["triage_source"], "heuristic");
        assert_eq!(value["validation"]["data_completeness"]["confidence_score"], 0.0);
        assert!(value["knowledge_graph"].get("node_index").is_none());
    }
}
