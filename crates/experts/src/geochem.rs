use extract::{Confidence, ExtractionEngine, Schema};
use ingest::DocumentText;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ExpertError;
use crate::keywords::has_geochem_signal;
use crate::passages::{extract_each, select_passages};
use crate::prompt::build_geochem_prompt;
use crate::types::{AnalysisTask, ContentIndex, ExpertKind};
use crate::ExpertSettings;

const MAJOR_OXIDES: &[&str] = &[
    "sio2", "al2o3", "fe2o3", "feo", "mgo", "cao", "na2o", "k2o", "tio2", "p2o5",
];

/// A measured value: a number when one could be read, otherwise the text as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Number(f64),
    Text(String),
}

impl EvidenceValue {
    /// Numeric strings ("3.4", "1,250") become numbers
    fn normalized(self) -> Self {
        match self {
            EvidenceValue::Text(text) => match text.replace(',', "").trim().parse::<f64>() {
                Ok(n) if n.is_finite() => EvidenceValue::Number(n),
                _ => EvidenceValue::Text(text),
            },
            number => number,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            EvidenceValue::Number(n) => Some(*n),
            EvidenceValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeochemReply {
    geochemical_conclusions: Vec<ConclusionReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConclusionReply {
    conclusion_text: String,
    #[serde(default)]
    rock_type: Option<String>,
    #[serde(default)]
    geochemical_affinity: Option<String>,
    #[serde(default)]
    supporting_evidence: Vec<EvidenceReply>,
    #[serde(default)]
    confidence_score: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EvidenceReply {
    element: String,
    value: EvidenceValue,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    measurement_method: Option<String>,
    #[serde(default)]
    sample_id: Option<String>,
    #[serde(default)]
    confidence_score: Confidence,
}

impl Schema for GeochemReply {
    const NAME: &'static str = "geochemical_extraction";

    fn validate(&self) -> Result<(), String> {
        for (i, conclusion) in self.geochemical_conclusions.iter().enumerate() {
            if conclusion.conclusion_text.trim().is_empty() {
                return Err(format!(
                    "geochemical_conclusions[{}].conclusion_text must not be empty",
                    i
                ));
            }
            conclusion
                .confidence_score
                .check(&format!("geochemical_conclusions[{}].confidence_score", i))?;

            for (j, evidence) in conclusion.supporting_evidence.iter().enumerate() {
                if evidence.element.trim().is_empty() {
                    return Err(format!(
                        "geochemical_conclusions[{}].supporting_evidence[{}].element must not be empty",
                        i, j
                    ));
                }
                evidence.confidence_score.check(&format!(
                    "geochemical_conclusions[{}].supporting_evidence[{}].confidence_score",
                    i, j
                ))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub element: String,
    pub value: EvidenceValue,
    pub unit: String,
    pub method: Option<String>,
    pub sample_id: Option<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conclusion {
    pub conclusion_id: String,
    pub rock_type: String,
    pub affinity: String,
    pub text: String,
    pub evidence: Vec<Evidence>,
    pub confidence: Confidence,
    /// 0-based chunk the conclusion came from
    pub passage: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeochemFinding {
    pub conclusions: Vec<Conclusion>,
    pub passages_analyzed: usize,
    pub confidence: Confidence,
}

impl GeochemFinding {
    pub fn evidence_count(&self) -> usize {
        self.conclusions.iter().map(|c| c.evidence.len()).sum()
    }

    pub fn has_quantitative_evidence(&self) -> bool {
        self.conclusions
            .iter()
            .flat_map(|c| c.evidence.iter())
            .any(|e| e.value.as_number().is_some())
    }
}

/// `wt%` for major oxides, `ppm` for everything else.
pub fn infer_unit(element: &str) -> &'static str {
    let lower = element.to_lowercase();
    if MAJOR_OXIDES.iter().any(|oxide| lower.contains(oxide)) {
        "wt%"
    } else {
        "ppm"
    }
}

pub struct GeochemExpert {
    engine: ExtractionEngine,
    settings: ExpertSettings,
}

impl GeochemExpert {
    pub fn new(engine: ExtractionEngine, settings: ExpertSettings) -> Self {
        Self { engine, settings }
    }

    pub async fn analyze(
        &self,
        doc: &DocumentText,
        _index: &ContentIndex,
        tasks: &[AnalysisTask],
    ) -> Result<GeochemFinding, ExpertError> {
        let passages = select_passages(
            doc,
            tasks,
            ExpertKind::Geochemical,
            has_geochem_signal,
            self.settings.max_passages,
        );
        info!(passages = passages.len(), "Geochemical expert starting");

        let replies = extract_each::<GeochemReply>(
            &self.engine,
            ExpertKind::Geochemical,
            &build_geochem_prompt(),
            &passages,
            self.settings.max_attempts,
        )
        .await?;

        let conclusions: Vec<Conclusion> = replies
            .into_iter()
            .flat_map(|(passage, reply)| {
                reply
                    .geochemical_conclusions
                    .into_iter()
                    .enumerate()
                    .map(move |(i, raw)| to_conclusion(passage, i + 1, raw))
            })
            .collect();

        let finding = GeochemFinding {
            confidence: Confidence::mean(conclusions.iter().map(|c| &c.confidence)),
            conclusions,
            passages_analyzed: passages.len(),
        };
        info!(
            conclusions = finding.conclusions.len(),
            evidence = finding.evidence_count(),
            "Geochemical expert finished"
        );

        Ok(finding)
    }
}

fn to_conclusion(passage: usize, seq: usize, raw: ConclusionReply) -> Conclusion {
    let known = |field: Option<String>| {
        field
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    };

    let evidence = raw
        .supporting_evidence
        .into_iter()
        .map(|e| {
            let unit = e
                .unit
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| infer_unit(&e.element).to_string());

            Evidence {
                element: e.element.trim().to_string(),
                value: e.value.normalized(),
                unit,
                method: e.measurement_method,
                sample_id: e.sample_id,
                confidence: e.confidence_score,
            }
        })
        .collect();

    Conclusion {
        conclusion_id: format!("passage_{}_conclusion_{}", passage + 1, seq),
        rock_type: known(raw.rock_type),
        affinity: known(raw.geochemical_affinity),
        text: raw.conclusion_text,
        evidence,
        confidence: raw.confidence_score,
        passage,
    }
}
