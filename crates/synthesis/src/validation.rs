use experts::{GeochemFinding, SpatialFinding, TabularFinding};
use serde::Serialize;

/// Outcome of one consistency check. Advisory only: a failed check lowers
/// confidence and never blocks synthesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// In `[0, 1]`
    pub confidence_score: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    fn new(confidence_score: f64, issues: Vec<String>, suggestions: Vec<String>) -> Self {
        Self {
            is_valid: issues.is_empty(),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            issues,
            suggestions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub spatial_consistency: ValidationResult,
    pub domain_consistency: ValidationResult,
    pub data_completeness: ValidationResult,
}

impl ValidationReport {
    pub fn run(spatial: &SpatialFinding, geochem: &GeochemFinding, tabular: &TabularFinding) -> Self {
        Self {
            spatial_consistency: check_spatial(spatial),
            domain_consistency: check_domain(geochem, tabular),
            data_completeness: check_completeness(spatial, geochem, tabular),
        }
    }

    pub fn checks(&self) -> [(&'static str, &ValidationResult); 3] {
        [
            ("spatial_consistency", &self.spatial_consistency),
            ("domain_consistency", &self.domain_consistency),
            ("data_completeness", &self.data_completeness),
        ]
    }

    /// Unweighted mean of the three check scores.
    pub fn overall_confidence(&self) -> f64 {
        self.checks().iter().map(|(_, r)| r.confidence_score).sum::<f64>() / 3.0
    }

    pub fn all_valid(&self) -> bool {
        self.checks().iter().all(|(_, r)| r.is_valid)
    }
}

/// Features exist and their coordinates are usable.
pub fn check_spatial(spatial: &SpatialFinding) -> ValidationResult {
    let total = spatial.features.len();
    if total == 0 {
        return ValidationResult::new(
            0.0,
            vec!["No spatial features extracted".to_string()],
            vec!["Check that map and location passages reached the spatial expert".to_string()],
        );
    }

    let degenerate = spatial.degenerate_count();
    if degenerate == 0 {
        return ValidationResult::new(1.0, Vec::new(), Vec::new());
    }

    ValidationResult::new(
        1.0 - (degenerate as f64 / total as f64) * 0.4,
        vec![format!(
            "{}/{} features have missing or default coordinates",
            degenerate, total
        )],
        vec!["Review coordinate extraction and the source map references".to_string()],
    )
}

/// Conclusions must be backed by a table or a measured value.
pub fn check_domain(geochem: &GeochemFinding, tabular: &TabularFinding) -> ValidationResult {
    if geochem.conclusions.is_empty() {
        return ValidationResult::new(
            0.0,
            vec!["No geochemical conclusions extracted".to_string()],
            vec!["Make sure geochemical passages are identified during triage".to_string()],
        );
    }

    if !tabular.tables.is_empty() || geochem.has_quantitative_evidence() {
        return ValidationResult::new(1.0, Vec::new(), Vec::new());
    }

    ValidationResult::new(
        0.7,
        vec![format!(
            "{} geochemical conclusions have no supporting table or measured value",
            geochem.conclusions.len()
        )],
        vec!["Improve table extraction to support the geochemical conclusions".to_string()],
    )
}

/// Fraction of the spatial, domain and tabular categories that produced data.
pub fn check_completeness(
    spatial: &SpatialFinding,
    geochem: &GeochemFinding,
    tabular: &TabularFinding,
) -> ValidationResult {
    let categories = [
        ("spatial", !spatial.features.is_empty()),
        ("geochemical", !geochem.conclusions.is_empty()),
        ("tabular", !tabular.tables.is_empty()),
    ];
    let present = categories.iter().filter(|(_, p)| *p).count();
    let completeness = present as f64 / categories.len() as f64;

    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    if present < 2 {
        let missing: Vec<&str> = categories
            .iter()
            .filter(|(_, p)| !p)
            .map(|(name, _)| *name)
            .collect();
        issues.push(format!(
            "Low data completeness: {:.0}% (missing {})",
            completeness * 100.0,
            missing.join(", ")
        ));
        suggestions.push("Ensure every kind of geological data is extracted".to_string());
    }

    ValidationResult::new(completeness, issues, suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{assay_table, conclusion, evidence, feature};
    use experts::EvidenceValue;

    #[test]
    fn test_spatial_penalizes_degenerate_coordinates() {
        let spatial = SpatialFinding {
            features: vec![
                feature("feature_1", "Zeta", Some(vec![[-7.1, 30.2]])),
                feature("feature_2", "Tizi", Some(vec![[0.0, 0.0]])),
            ],
            ..SpatialFinding::default()
        };

        let result = check_spatial(&spatial);

        assert!(!result.is_valid);
        assert!((result.confidence_score - 0.8).abs() < 1e-9);
        assert_eq!(result.issues, vec!["1/2 features have missing or default coordinates"]);
    }

    #[test]
    fn test_spatial_without_features_scores_zero() {
        let result = check_spatial(&SpatialFinding::default());
        assert!(!result.is_valid);
        assert_eq!(result.confidence_score, 0.0);
    }

    #[test]
    fn test_domain_supported_by_measured_value() {
        let mut backed = conclusion("passage_1_conclusion_1", "granite", "unknown");
        backed.evidence.push(evidence("Au", EvidenceValue::Number(3.4)));
        let geochem = GeochemFinding {
            conclusions: vec![backed],
            ..GeochemFinding::default()
        };

        let result = check_domain(&geochem, &TabularFinding::default());

        assert!(result.is_valid);
        assert_eq!(result.confidence_score, 1.0);
    }

    #[test]
    fn test_domain_supported_by_table() {
        let geochem = GeochemFinding {
            conclusions: vec![conclusion("passage_1_conclusion_1", "granite", "unknown")],
            ..GeochemFinding::default()
        };
        let tabular = TabularFinding {
            tables: vec![assay_table("table_1")],
            ..TabularFinding::default()
        };

        assert!(check_domain(&geochem, &tabular).is_valid);
    }

    #[test]
    fn test_domain_unsupported_conclusion_flagged() {
        let mut qualitative = conclusion("passage_1_conclusion_1", "granite", "unknown");
        qualitative.evidence.push(evidence("Au", EvidenceValue::Text("anomalous".to_string())));
        let geochem = GeochemFinding {
            conclusions: vec![qualitative],
            ..GeochemFinding::default()
        };

        let result = check_domain(&geochem, &TabularFinding::default());

        assert!(!result.is_valid);
        assert_eq!(result.confidence_score, 0.7);
        assert_eq!(result.suggestions.len(), 1);
    }

    #[test]
    fn test_completeness_fraction() {
        let spatial = SpatialFinding {
            features: vec![feature("feature_1", "Zeta", None)],
            ..SpatialFinding::default()
        };

        let one = check_completeness(&spatial, &GeochemFinding::default(), &TabularFinding::default());
        assert!(!one.is_valid);
        assert!((one.confidence_score - 1.0 / 3.0).abs() < 1e-9);
        assert!(one.issues[0].contains("missing geochemical, tabular"));

        let tabular = TabularFinding {
            tables: vec![assay_table("table_1")],
            ..TabularFinding::default()
        };
        let two = check_completeness(&spatial, &GeochemFinding::default(), &tabular);
        assert!(two.is_valid);
    }

    #[test]
    fn test_empty_findings_score_zero_overall() {
        let report = ValidationReport::run(
            &SpatialFinding::default(),
            &GeochemFinding::default(),
            &TabularFinding::default(),
        );

        assert_eq!(report.overall_confidence(), 0.0);
        assert!(!report.all_valid());
    }
}
