use extract::{Confidence, ExtractionEngine, Schema};
use ingest::DocumentText;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::ExpertError;
use crate::keywords::has_spatial_signal;
use crate::passages::{extract_each, select_passages};
use crate::prompt::build_spatial_prompt;
use crate::types::{AnalysisTask, ContentIndex, ExpertKind};
use crate::ExpertSettings;

static COORDINATE_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+\.?\d*)[°,\s]+(-?\d+\.?\d*)").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeometryKind {
    LineString,
    Polygon,
    #[default]
    #[serde(other)]
    Point,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpatialReply {
    spatial_features: Vec<FeatureReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeatureReply {
    name: String,
    #[serde(default)]
    feature_type: Option<String>,
    #[serde(default)]
    geometry_type: GeometryKind,
    #[serde(default)]
    description: String,
    #[serde(default)]
    coordinates: Value,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    confidence_score: Confidence,
}

impl Schema for SpatialReply {
    const NAME: &'static str = "spatial_extraction";

    fn validate(&self) -> Result<(), String> {
        for (i, feature) in self.spatial_features.iter().enumerate() {
            if feature.name.trim().is_empty() {
                return Err(format!("spatial_features[{}].name must not be empty", i));
            }
            feature
                .confidence_score
                .check(&format!("spatial_features[{}].confidence_score", i))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialFeature {
    pub feature_id: String,
    pub name: String,
    pub description: String,
    pub feature_type: String,
    pub geometry: GeometryKind,
    /// `[lon, lat]` pairs; absent when the text gave none or they were out of range
    pub coordinates: Option<Vec<[f64; 2]>>,
    pub properties: Map<String, Value>,
    pub confidence: Confidence,
    /// 0-based chunk the feature came from
    pub passage: usize,
}

impl SpatialFeature {
    /// No usable coordinates, or only the origin
    pub fn is_degenerate(&self) -> bool {
        match &self.coordinates {
            None => true,
            Some(points) => points.iter().all(|[lon, lat]| *lon == 0.0 && *lat == 0.0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialFinding {
    pub features: Vec<SpatialFeature>,
    pub passages_analyzed: usize,
    pub confidence: Confidence,
}

impl SpatialFinding {
    pub fn degenerate_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_degenerate()).count()
    }
}

pub struct SpatialExpert {
    engine: ExtractionEngine,
    settings: ExpertSettings,
}

impl SpatialExpert {
    pub fn new(engine: ExtractionEngine, settings: ExpertSettings) -> Self {
        Self { engine, settings }
    }

    pub async fn analyze(
        &self,
        doc: &DocumentText,
        _index: &ContentIndex,
        tasks: &[AnalysisTask],
    ) -> Result<SpatialFinding, ExpertError> {
        let passages = select_passages(
            doc,
            tasks,
            ExpertKind::Spatial,
            has_spatial_signal,
            self.settings.max_passages,
        );
        info!(passages = passages.len(), "Spatial expert starting");

        let replies = extract_each::<SpatialReply>(
            &self.engine,
            ExpertKind::Spatial,
            &build_spatial_prompt(),
            &passages,
            self.settings.max_attempts,
        )
        .await?;

        let mut features: Vec<SpatialFeature> = Vec::new();
        for (passage, reply) in replies {
            for raw in reply.spatial_features {
                let feature = to_feature(passage, features.len() + 1, raw);
                merge_feature(&mut features, feature);
            }
        }

        let confidence = Confidence::mean(features.iter().map(|f| &f.confidence));
        info!(
            features = features.len(),
            degenerate = features.iter().filter(|f| f.is_degenerate()).count(),
            "Spatial expert finished"
        );

        Ok(SpatialFinding {
            features,
            passages_analyzed: passages.len(),
            confidence,
        })
    }
}

fn to_feature(passage: usize, seq: usize, raw: FeatureReply) -> SpatialFeature {
    let coordinates = parse_coordinates(&raw.coordinates);
    if coordinates.is_none() && !raw.coordinates.is_null() {
        debug!(name = %raw.name, coordinates = %raw.coordinates, "No usable coordinates");
    }

    let feature_type = raw.feature_type.unwrap_or_else(|| {
        match raw.geometry_type {
            GeometryKind::Point => "point",
            GeometryKind::LineString => "line",
            GeometryKind::Polygon => "polygon",
        }
        .to_string()
    });

    SpatialFeature {
        feature_id: format!("feature_{}", seq),
        name: raw.name.trim().to_string(),
        description: raw.description,
        feature_type,
        geometry: raw.geometry_type,
        coordinates,
        properties: raw.properties.unwrap_or_default(),
        confidence: raw.confidence_score,
        passage,
    }
}

/// The same feature named in several passages is kept once, preferring
/// the copy with coordinates, then the more confident one.
fn merge_feature(features: &mut Vec<SpatialFeature>, feature: SpatialFeature) {
    let existing = features
        .iter_mut()
        .find(|f| f.name.eq_ignore_ascii_case(&feature.name));

    match existing {
        None => features.push(feature),
        Some(current) => {
            let better = (current.is_degenerate() && !feature.is_degenerate())
                || (current.is_degenerate() == feature.is_degenerate()
                    && more_confident(feature.confidence, current.confidence));
            if better {
                let feature_id = current.feature_id.clone();
                *current = SpatialFeature {
                    feature_id,
                    ..feature
                };
            }
        }
    }
}

/// A known score beats an unknown one; two unknowns tie.
fn more_confident(candidate: Confidence, current: Confidence) -> bool {
    match (candidate.value(), current.value()) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Read coordinates from text (`"lon, lat"`), a `[lon, lat]` array, nested
/// arrays, or a `{lon, lat}` object. Any value outside [-180, 180] voids the
/// whole set.
pub fn parse_coordinates(value: &Value) -> Option<Vec<[f64; 2]>> {
    let mut points = Vec::new();

    match value {
        Value::String(text) => {
            for caps in COORDINATE_PAIR.captures_iter(text) {
                let lon = caps[1].parse::<f64>().ok()?;
                let lat = caps[2].parse::<f64>().ok()?;
                points.push([lon, lat]);
            }
        }
        Value::Array(_) => collect_pairs(value, &mut points),
        Value::Object(map) => {
            let lon = map.get("lon").or_else(|| map.get("longitude"))?.as_f64()?;
            let lat = map.get("lat").or_else(|| map.get("latitude"))?.as_f64()?;
            points.push([lon, lat]);
        }
        _ => {}
    }

    let in_range = |c: f64| c.is_finite() && (-180.0..=180.0).contains(&c);
    if points.is_empty() || !points.iter().all(|[lon, lat]| in_range(*lon) && in_range(*lat)) {
        return None;
    }
    Some(points)
}

fn collect_pairs(value: &Value, out: &mut Vec<[f64; 2]>) {
    let Value::Array(items) = value else {
        return;
    };

    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(lon), Some(lat)) => out.push([lon, lat]),
        _ => items.iter().for_each(|item| collect_pairs(item, out)),
    }
}
