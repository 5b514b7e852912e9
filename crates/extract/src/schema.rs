use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;

/// Declared shape a structured extraction must satisfy.
///
/// A value counts as valid only if it deserializes into the implementing type
/// *and* passes [`Schema::validate`]. There is no partial acceptance.
pub trait Schema: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Short name used in logs and corrective feedback
    const NAME: &'static str;

    /// Semantic checks serde cannot express (ranges, non-empty fields).
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Deserialize and validate a JSON value against `S`.
pub fn conform<S: Schema>(value: Value) -> Result<S, ParseError> {
    let parsed: S = serde_json::from_value(value).map_err(|e| ParseError::Schema {
        schema: S::NAME,
        message: e.to_string(),
    })?;

    parsed.validate().map_err(|message| ParseError::Invalid {
        schema: S::NAME,
        message,
    })?;

    Ok(parsed)
}

/// A model-reported confidence score.
///
/// Absent means *unknown*: it serializes as `null` and is never read as 0 or 1.
/// Fields of this type should carry `#[serde(default)]` so a reply that omits
/// the score still validates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(Option<f64>);

impl Confidence {
    pub const UNKNOWN: Confidence = Confidence(None);

    pub fn new(score: f64) -> Self {
        Confidence(Some(score))
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }

    /// Score, or `fallback` when unknown. Callers pick the fallback explicitly.
    pub fn or(&self, fallback: f64) -> f64 {
        self.0.unwrap_or(fallback)
    }

    pub fn check(&self, field: &str) -> Result<(), String> {
        match self.0 {
            Some(score) if !(0.0..=1.0).contains(&score) || score.is_nan() => Err(format!(
                "{} must be between 0.0 and 1.0, got {}",
                field, score
            )),
            _ => Ok(()),
        }
    }

    /// Mean of the known scores; unknown when none are known.
    pub fn mean<'a>(scores: impl IntoIterator<Item = &'a Confidence>) -> Confidence {
        let known: Vec<f64> = scores.into_iter().filter_map(|c| c.0).collect();
        if known.is_empty() {
            Confidence::UNKNOWN
        } else {
            Confidence::new(known.iter().sum::<f64>() / known.len() as f64)
        }
    }
}
