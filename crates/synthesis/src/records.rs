use experts::{Conclusion, GeochemFinding, SpatialFinding, TabularFinding};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::graph::{geochem_node_id, spatial_node_id, KnowledgeGraph, SPATIAL_GEOCHEMICAL};

pub const COORDINATE_SYSTEM: &str = "WGS84";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTable {
    Locations,
    DomainFindings,
    DomainEvidence,
    StructuredDatasets,
}

impl RecordTable {
    pub fn name(&self) -> &'static str {
        match self {
            RecordTable::Locations => "locations",
            RecordTable::DomainFindings => "domain_findings",
            RecordTable::DomainEvidence => "domain_evidence",
            RecordTable::StructuredDatasets => "structured_datasets",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references: RecordTable,
    /// `None` when there was no unambiguous row to point at
    pub referenced_id: Option<String>,
}

/// One row ready for a relational sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceRecord {
    pub table: RecordTable,
    pub record_id: String,
    pub fields: Map<String, Value>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl PersistenceRecord {
    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

fn location_id(feature_id: &str) -> String {
    format!("loc_{}", feature_id)
}

fn finding_id(conclusion_id: &str) -> String {
    format!("finding_{}", conclusion_id)
}

/// Project the findings onto the locations / domain_findings /
/// domain_evidence / structured_datasets tables.
///
/// Ids are derived from the finding ids, so the same findings always map to
/// the same records. A finding is anchored to a location only when exactly
/// one candidate exists; otherwise its `location_id` stays null.
pub fn map_records(
    source_document: &str,
    spatial: &SpatialFinding,
    geochem: &GeochemFinding,
    tabular: &TabularFinding,
    graph: &KnowledgeGraph,
) -> Vec<PersistenceRecord> {
    let mut records = Vec::new();

    for feature in &spatial.features {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(feature.name));
        fields.insert("location_type".into(), json!(feature.feature_type));
        fields.insert("geometry_type".into(), json!(feature.geometry));
        fields.insert("coordinates".into(), json!(feature.coordinates));
        fields.insert("coordinate_system".into(), json!(COORDINATE_SYSTEM));
        fields.insert("description".into(), json!(feature.description));
        fields.insert("confidence_score".into(), json!(feature.confidence));
        fields.insert("source_document".into(), json!(source_document));

        records.push(PersistenceRecord {
            table: RecordTable::Locations,
            record_id: location_id(&feature.feature_id),
            fields,
            foreign_keys: Vec::new(),
        });
    }

    // A document with a single location anchors everything to it
    let sole_location = match spatial.features.as_slice() {
        [only] => Some(location_id(&only.feature_id)),
        _ => None,
    };

    for conclusion in &geochem.conclusions {
        let anchor = linked_location(conclusion, spatial, graph).or_else(|| sole_location.clone());
        records.push(finding_record(source_document, conclusion, anchor));

        for (n, evidence) in conclusion.evidence.iter().enumerate() {
            let mut fields = Map::new();
            fields.insert("element".into(), json!(evidence.element));
            fields.insert("value".into(), json!(evidence.value.as_number()));
            fields.insert("reported_value".into(), json!(evidence.value));
            fields.insert("unit".into(), json!(evidence.unit));
            fields.insert("measurement_method".into(), json!(evidence.method));
            fields.insert("sample_id".into(), json!(evidence.sample_id));
            fields.insert("confidence_score".into(), json!(evidence.confidence));

            records.push(PersistenceRecord {
                table: RecordTable::DomainEvidence,
                record_id: format!("evidence_{}_{}", conclusion.conclusion_id, n + 1),
                fields,
                foreign_keys: vec![ForeignKey {
                    column: "finding_id".to_string(),
                    references: RecordTable::DomainFindings,
                    referenced_id: Some(finding_id(&conclusion.conclusion_id)),
                }],
            });
        }
    }

    for table in &tabular.tables {
        let rows: Vec<Value> = table
            .rows
            .iter()
            .map(|row| {
                let cells: Map<String, Value> = table
                    .columns
                    .iter()
                    .zip(&row.cells)
                    .map(|(column, cell)| (column.clone(), json!(cell)))
                    .collect();
                Value::Object(cells)
            })
            .collect();

        let mut fields = Map::new();
        fields.insert("table_name".into(), json!(table.table_name));
        fields.insert("columns".into(), json!(table.columns));
        fields.insert("column_types".into(), json!(table.column_types));
        fields.insert("row_count".into(), json!(table.rows.len()));
        fields.insert("rows".into(), Value::Array(rows));
        fields.insert("quality_score".into(), json!(table.quality.overall));
        fields.insert("source_document".into(), json!(source_document));

        records.push(PersistenceRecord {
            table: RecordTable::StructuredDatasets,
            record_id: format!("dataset_{}", table.table_id),
            fields,
            foreign_keys: vec![ForeignKey {
                column: "location_id".to_string(),
                references: RecordTable::Locations,
                referenced_id: sole_location.clone(),
            }],
        });
    }

    records
}

fn finding_record(
    source_document: &str,
    conclusion: &Conclusion,
    location: Option<String>,
) -> PersistenceRecord {
    let mut fields = Map::new();
    fields.insert("rock_type".into(), json!(conclusion.rock_type));
    fields.insert("geochemical_affinity".into(), json!(conclusion.affinity));
    fields.insert("conclusion".into(), json!(conclusion.text));
    fields.insert("analysis_method".into(), json!("literature_extraction"));
    fields.insert("confidence_score".into(), json!(conclusion.confidence));
    fields.insert("source_document".into(), json!(source_document));

    PersistenceRecord {
        table: RecordTable::DomainFindings,
        record_id: finding_id(&conclusion.conclusion_id),
        fields,
        foreign_keys: vec![ForeignKey {
            column: "location_id".to_string(),
            references: RecordTable::Locations,
            referenced_id: location,
        }],
    }
}

/// The one location linked to `conclusion` in the graph, if exactly one is.
fn linked_location(
    conclusion: &Conclusion,
    spatial: &SpatialFinding,
    graph: &KnowledgeGraph,
) -> Option<String> {
    let node = geochem_node_id(&conclusion.conclusion_id);
    let linked: Vec<&str> = spatial
        .features
        .iter()
        .filter(|f| {
            let id = spatial_node_id(&f.feature_id);
            graph
                .edges
                .iter()
                .any(|e| e.relation == SPATIAL_GEOCHEMICAL && e.source == id && e.target == node)
        })
        .map(|f| f.feature_id.as_str())
        .collect();

    match linked.as_slice() {
        [only] => Some(location_id(only)),
        _ => None,
    }
}
