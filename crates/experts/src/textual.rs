use extract::{ExtractionEngine, Schema};
use ingest::DocumentText;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::error::ExpertError;
use crate::normalizer::EntityNormalizer;
use crate::passages::{extract_each, select_passages, Passage};
use crate::prompt::build_textual_prompt;
use crate::types::{AnalysisTask, ContentIndex, ExpertKind};
use crate::ExpertSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TextReply {
    entities: Vec<EntityReply>,
    #[serde(default)]
    relations: Vec<RelationReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityReply {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(rename = "type", default)]
    entity_type: Option<String>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelationReply {
    source: String,
    target: String,
    relation: String,
    #[serde(default)]
    evidence: String,
}

impl Schema for TextReply {
    const NAME: &'static str = "entity_extraction";

    fn validate(&self) -> Result<(), String> {
        if let Some(i) = self.entities.iter().position(|e| e.name.trim().is_empty()) {
            return Err(format!("entities[{}].name must not be empty", i));
        }
        if let Some(i) = self
            .relations
            .iter()
            .position(|r| r.source.trim().is_empty() || r.target.trim().is_empty())
        {
            return Err(format!("relations[{}] must name both source and target", i));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEntity {
    /// Normalized name; unique within a finding
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub mentions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRelation {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextualFinding {
    pub entities: Vec<TextEntity>,
    pub relations: Vec<TextRelation>,
    pub passages_analyzed: usize,
}

pub struct TextualExpert {
    engine: ExtractionEngine,
    settings: ExpertSettings,
}

impl TextualExpert {
    pub fn new(engine: ExtractionEngine, settings: ExpertSettings) -> Self {
        Self { engine, settings }
    }

    pub async fn analyze(
        &self,
        doc: &DocumentText,
        _index: &ContentIndex,
        tasks: &[AnalysisTask],
    ) -> Result<TextualFinding, ExpertError> {
        let cap = self.settings.textual_chunks;
        let mut passages = select_passages(doc, tasks, ExpertKind::Textual, |_| false, cap);
        if passages.is_empty() {
            passages = doc
                .chunks
                .iter()
                .take(cap)
                .enumerate()
                .map(|(index, text)| Passage {
                    index,
                    text: text.clone(),
                })
                .collect();
        }
        info!(passages = passages.len(), "Textual expert starting");

        let replies = extract_each::<TextReply>(
            &self.engine,
            ExpertKind::Textual,
            &build_textual_prompt(),
            &passages,
            self.settings.max_attempts,
        )
        .await?;

        let mut normalizer = EntityNormalizer::new();
        let mut finding = TextualFinding {
            passages_analyzed: passages.len(),
            ..TextualFinding::default()
        };

        for (_, reply) in replies {
            merge_reply(&mut finding, &mut normalizer, reply);
        }

        info!(
            entities = finding.entities.len(),
            relations = finding.relations.len(),
            "Textual expert finished"
        );
        Ok(finding)
    }
}

fn merge_reply(finding: &mut TextualFinding, normalizer: &mut EntityNormalizer, reply: TextReply) {
    // Local ids ("E1") are only meaningful within one reply
    let mut by_id: HashMap<String, String> = HashMap::new();

    for raw in reply.entities {
        let name = normalizer.normalize(&raw.name);
        if let Some(id) = raw.id {
            by_id.insert(id, name.clone());
        }

        match finding.entities.iter_mut().find(|e| e.name == name) {
            Some(existing) => {
                existing.mentions += 1;
                if existing.description.is_empty() {
                    existing.description = raw.description;
                }
            }
            None => finding.entities.push(TextEntity {
                name,
                entity_type: raw
                    .entity_type
                    .map(|t| t.trim().to_uppercase())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                description: raw.description,
                mentions: 1,
            }),
        }
    }

    for raw in reply.relations {
        let mut resolve = |endpoint: &str| {
            by_id
                .get(endpoint.trim())
                .cloned()
                .unwrap_or_else(|| normalizer.normalize(endpoint))
        };
        let relation = TextRelation {
            source: resolve(&raw.source),
            target: resolve(&raw.target),
            relation: raw.relation.trim().to_lowercase().replace(' ', "_"),
            evidence: raw.evidence,
        };

        let known = |name: &str| finding.entities.iter().any(|e| e.name == name);
        if relation.source == relation.target
            || !known(&relation.source)
            || !known(&relation.target)
            || finding.relations.iter().any(|r| {
                r.source == relation.source
                    && r.target == relation.target
                    && r.relation == relation.relation
            })
        {
            continue;
        }
        finding.relations.push(relation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::heuristic_index;
    use extract::testing::ScriptedCompletion;
    use extract::RetryPolicy;
    use std::sync::Arc;

    fn reply(json: &str) -> TextReply {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_relations_resolved_through_local_ids() {
        let mut finding = TextualFinding::default();
        let mut normalizer = EntityNormalizer::new();

        merge_reply(
            &mut finding,
            &mut normalizer,
            reply(
                r#"{"entities": [
                    {"id": "E1", "name": "Tizi Granite", "type": "rock_unit"},
                    {"id": "E2", "name": "Zeta Prospect", "type": "DEPOSIT"}
                ],
                "relations": [
                    {"source": "E1", "target": "E2", "relation": "Hosts"},
                    {"source": "E1", "target": "E9", "relation": "intrudes"}
                ]}"#,
            ),
        );

        assert_eq!(finding.entities.len(), 2);
        assert_eq!(finding.entities[0].entity_type, "ROCK_UNIT");
        assert_eq!(
            finding.relations,
            vec![TextRelation {
                source: "tizi granite".to_string(),
                target: "zeta prospect".to_string(),
                relation: "hosts".to_string(),
                evidence: String::new(),
            }]
        );
    }

    #[test]
    fn test_entities_merged_across_replies() {
        let mut finding = TextualFinding::default();
        let mut normalizer = EntityNormalizer::new();

        merge_reply(
            &mut finding,
            &mut normalizer,
            reply(r#"{"entities": [{"id": "E1", "name": "Zeta Prospect"}]}"#),
        );
        merge_reply(
            &mut finding,
            &mut normalizer,
            reply(r#"{"entities": [{"id": "E1", "name": "zeta prospect.", "description": "gold showing"}]}"#),
        );

        assert_eq!(finding.entities.len(), 1);
        assert_eq!(finding.entities[0].mentions, 2);
        assert_eq!(finding.entities[0].description, "gold showing");
    }

    #[tokio::test]
    async fn test_analyze_first_chunks_without_tasks() {
        let service = Arc::new(ScriptedCompletion::always(
            r#"{"entities": [{"id": "E1", "name": "Location Zeta", "type": "LOCATION"}], "relations": []}"#,
        ));
        let engine = ExtractionEngine::new(service.clone(), None, RetryPolicy::immediate());
        let expert = TextualExpert::new(engine, ExpertSettings::default());
        let text = (1..=8)
            .map(|i| format!("Paragraph {} describes the field season.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let doc = DocumentText::from_text("season.txt", text);
        let index = heuristic_index(&doc, 20);

        let finding = expert.analyze(&doc, &index, &[]).await.unwrap();

        assert_eq!(service.call_count(), ExpertSettings::default().textual_chunks);
        assert_eq!(finding.entities.len(), 1);
        assert_eq!(finding.entities[0].mentions, ExpertSettings::default().textual_chunks);
    }
}
