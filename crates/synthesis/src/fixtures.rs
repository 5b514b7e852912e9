use experts::standardize::{standardize_table, RawTable};
use experts::{
    Conclusion, Evidence, EvidenceValue, GeometryKind, SpatialFeature, StandardizedTable,
};
use extract::Confidence;
use serde_json::{json, Map};

pub fn feature(id: &str, name: &str, coordinates: Option<Vec<[f64; 2]>>) -> SpatialFeature {
    SpatialFeature {
        feature_id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        feature_type: "prospect".to_string(),
        geometry: GeometryKind::Point,
        coordinates,
        properties: Map::new(),
        confidence: Confidence::new(0.8),
        passage: 0,
    }
}

pub fn conclusion(id: &str, rock_type: &str, affinity: &str) -> Conclusion {
    Conclusion {
        conclusion_id: id.to_string(),
        rock_type: rock_type.to_string(),
        affinity: affinity.to_string(),
        text: format!("{} with {} affinity", rock_type, affinity),
        evidence: Vec::new(),
        confidence: Confidence::UNKNOWN,
        passage: 0,
    }
}

pub fn evidence(element: &str, value: EvidenceValue) -> Evidence {
    Evidence {
        element: element.to_string(),
        value,
        unit: "ppm".to_string(),
        method: None,
        sample_id: Some("AX-12".to_string()),
        confidence: Confidence::new(0.9),
    }
}

pub fn assay_table(table_id: &str) -> StandardizedTable {
    let mut row = Map::new();
    row.insert("Sample".to_string(), json!("AX-12"));
    row.insert("Au (ppm)".to_string(), json!("3.4"));

    standardize_table(
        &RawTable {
            table_name: Some("Assays".to_string()),
            columns: vec![Some("Sample".to_string()), Some("Au (ppm)".to_string())],
            rows: vec![row],
            raw_text: "AX-12 3.4".to_string(),
        },
        table_id,
    )
    .expect("assay table has rows")
}
