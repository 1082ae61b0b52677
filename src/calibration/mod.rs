//! Score calibration engine: functional score ranges with interval
//! semantics, ACMG/odds-path coherence, and per-variant classification.

pub mod acmg;
pub mod lookup;
pub mod ops;
pub mod oddspaths;

use crate::calibration::acmg::AcmgClassification;
use crate::calibration::oddspaths::oddspaths_evidence_strength_equivalent;
use crate::error::ValidationError;
use crate::tabular::Table;

/// Column names of the calibration classes CSV.
pub const CALIBRATION_VARIANT_COLUMN: &str = "variant_urn";
pub const CALIBRATION_CLASS_COLUMN: &str = "functional_class";

/// Functional classification of a score range or variant class.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FunctionalClass {
    Normal,
    Abnormal,
    #[default]
    NotSpecified,
}

/// A numeric score interval; `None` ends are unbounded (±∞ sentinels).
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoreRange {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ScoreRange {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// The lower bound with the −∞ sentinel applied.
    pub fn lower_bound(&self) -> f64 {
        self.lower.unwrap_or(f64::NEG_INFINITY)
    }

    /// The upper bound with the +∞ sentinel applied.
    pub fn upper_bound(&self) -> f64 {
        self.upper.unwrap_or(f64::INFINITY)
    }
}

/// A labeled functional classification: a half-open numeric range (with
/// inclusivity overrides) or a symbolic class key, plus optional evidence
/// metadata.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FunctionalClassification {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub functional_classification: FunctionalClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ScoreRange>,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusive_lower_bound: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusive_upper_bound: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acmg_classification: Option<AcmgClassification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oddspaths_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_likelihood_ratio: Option<f64>,
}

impl FunctionalClassification {
    pub fn range_based(&self) -> bool {
        self.range.is_some()
    }

    pub fn class_based(&self) -> bool {
        self.class.is_some()
    }

    /// Effective lower inclusivity; ranges are inclusive-lower by default.
    pub fn inclusive_lower(&self) -> bool {
        self.inclusive_lower_bound.unwrap_or(true)
    }

    /// Effective upper inclusivity; ranges are exclusive-upper by default.
    pub fn inclusive_upper(&self) -> bool {
        self.inclusive_upper_bound.unwrap_or(false)
    }

    /// Trim label/class text and default the inclusivity flags for ranges.
    pub fn normalize(&mut self) {
        self.label = self.label.trim().to_owned();
        if let Some(class) = &self.class {
            self.class = Some(class.trim().to_owned());
        }
        if self.range.is_some() {
            self.inclusive_lower_bound = Some(self.inclusive_lower());
            self.inclusive_upper_bound = Some(self.inclusive_upper());
        }
    }

    /// Whether a score falls within this classification's range.
    pub fn contains_score(&self, score: f64) -> bool {
        let Some(range) = &self.range else {
            return false;
        };
        let lower = range.lower_bound();
        let upper = range.upper_bound();
        let lower_check = score > lower || (self.inclusive_lower() && score == lower);
        let upper_check = score < upper || (self.inclusive_upper() && score == upper);
        lower_check && upper_check
    }

    /// Validate the classification in isolation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.label.trim().is_empty() {
            return Err(ValidationError::new(
                "a functional classification label may not be empty or contain only whitespace",
            ));
        }
        if self
            .class
            .as_ref()
            .is_some_and(|class| class.trim().is_empty())
        {
            return Err(ValidationError::new(
                "a functional classification class may not be empty or contain only whitespace",
            ));
        }

        match (&self.range, &self.class) {
            (None, None) => {
                return Err(ValidationError::new(
                    "a functional classification must specify either a numeric range or a class",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ValidationError::new(
                    "a functional classification may not specify both a numeric range and a class",
                ))
            }
            _ => {}
        }

        if let Some(range) = &self.range {
            let lower = range.lower_bound();
            let upper = range.upper_bound();
            if lower > upper {
                return Err(ValidationError::new(
                    "the lower bound cannot exceed the upper bound",
                ));
            }
            if lower == upper {
                return Err(ValidationError::new(
                    "the lower and upper bounds cannot be identical",
                ));
            }
            if self.inclusive_lower_bound == Some(true) && range.lower.is_none() {
                return Err(ValidationError::new(
                    "an inclusive lower bound may not include negative infinity",
                ));
            }
            if self.inclusive_upper_bound == Some(true) && range.upper.is_none() {
                return Err(ValidationError::new(
                    "an inclusive upper bound may not include positive infinity",
                ));
            }
        } else {
            if self.inclusive_lower_bound.is_some() {
                return Err(ValidationError::new(
                    "an inclusive lower bound may not be set on a class based classification",
                ));
            }
            if self.inclusive_upper_bound.is_some() {
                return Err(ValidationError::new(
                    "an inclusive upper bound may not be set on a class based classification",
                ));
            }
        }

        for ratio in [self.oddspaths_ratio, self.positive_likelihood_ratio]
            .into_iter()
            .flatten()
        {
            if ratio < 0.0 {
                return Err(ValidationError::new(
                    "the ratio must be greater than or equal to 0",
                ));
            }
        }

        if let Some(acmg) = &self.acmg_classification {
            let agrees = match self.functional_classification {
                FunctionalClass::Normal => acmg.criterion.is_benign(),
                FunctionalClass::Abnormal => acmg.criterion.is_pathogenic(),
                FunctionalClass::NotSpecified => false,
            };
            if !agrees {
                return Err(ValidationError::new(format!(
                    "the ACMG classification criterion ({}) must agree with the functional \
                     classification ({})",
                    acmg.criterion, self.functional_classification
                )));
            }

            if let Some(ratio) = self.oddspaths_ratio {
                let equivalent = oddspaths_evidence_strength_equivalent(ratio);
                if equivalent != Some((acmg.criterion, acmg.evidence_strength)) {
                    return Err(ValidationError::new(format!(
                        "the provided oddspaths_ratio ({}) does not agree with the provided \
                         ACMG classification ({}, {})",
                        ratio, acmg.criterion, acmg.evidence_strength
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A score calibration: a set of functional classifications over one score
/// set, with publication sources grouped by relation.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoreCalibration {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
    pub score_set_id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_score_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub research_use_only: bool,
    #[serde(default = "default_true")]
    pub private: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub investigator_provided: bool,
    /// Publication identifier ids grouped by source relation.
    #[serde(default)]
    pub threshold_sources: Vec<i64>,
    #[serde(default)]
    pub classification_sources: Vec<i64>,
    #[serde(default)]
    pub method_sources: Vec<i64>,
    #[serde(default)]
    pub functional_classifications: Vec<FunctionalClassification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_metadata: Option<serde_json::Value>,
    pub creation_date: chrono::NaiveDate,
    pub modification_date: chrono::NaiveDate,
}

fn default_true() -> bool {
    true
}

impl ScoreCalibration {
    pub fn range_based(&self) -> bool {
        self.functional_classifications
            .first()
            .is_some_and(FunctionalClassification::range_based)
    }

    pub fn class_based(&self) -> bool {
        self.functional_classifications
            .first()
            .is_some_and(FunctionalClassification::class_based)
    }

    /// Normalize all contained classifications.
    pub fn normalize(&mut self) {
        for classification in &mut self.functional_classifications {
            classification.normalize();
        }
    }

    /// Validate the calibration and all contained classifications.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for classification in &self.functional_classifications {
            classification.validate()?;
        }

        self.validate_unique_labels_and_classes()?;
        self.validate_uniform_kind()?;
        self.validate_no_overlap()?;
        self.validate_baseline_score()?;

        if self.primary && self.research_use_only {
            return Err(ValidationError::new(
                "primary score calibrations may not be marked as research use only",
            ));
        }
        if self.primary && self.private {
            return Err(ValidationError::new(
                "primary score calibrations may not be marked as private",
            ));
        }

        Ok(())
    }

    fn validate_unique_labels_and_classes(&self) -> Result<(), ValidationError> {
        let mut labels = std::collections::HashSet::new();
        let mut classes = std::collections::HashSet::new();
        for classification in &self.functional_classifications {
            if !labels.insert(classification.label.trim()) {
                return Err(ValidationError::new(format!(
                    "detected repeated label '{}'; functional classification labels must be unique",
                    classification.label.trim()
                )));
            }
            if let Some(class) = &classification.class {
                if !classes.insert(class.trim()) {
                    return Err(ValidationError::new(format!(
                        "detected repeated class name '{}'; functional classification class \
                         names must be unique",
                        class.trim()
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_uniform_kind(&self) -> Result<(), ValidationError> {
        let range_based = self
            .functional_classifications
            .iter()
            .filter(|c| c.range_based())
            .count();
        let class_based = self
            .functional_classifications
            .iter()
            .filter(|c| c.class_based())
            .count();
        if range_based > 0 && class_based > 0 {
            return Err(ValidationError::new(
                "all functional classifications within a score calibration must be of the same \
                 type (either all range-based or all class-based)",
            ));
        }
        Ok(())
    }

    /// The documented overlap rule: two range-based classifications conflict
    /// unless strictly disjoint, or touching with at most one inclusive end;
    /// a `not_specified` classification on either side is the only escape.
    fn validate_no_overlap(&self) -> Result<(), ValidationError> {
        let classifications = &self.functional_classifications;
        for (i, a) in classifications.iter().enumerate() {
            for b in classifications.iter().skip(i + 1) {
                if ranges_conflict(a, b) {
                    return Err(ValidationError::new(format!(
                        "classified score ranges may not overlap; '{}' overlaps with '{}'; to \
                         allow overlap, set one or both classifications to 'not_specified'",
                        a.label, b.label
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_baseline_score(&self) -> Result<(), ValidationError> {
        let Some(baseline) = self.baseline_score else {
            return Ok(());
        };
        for classification in &self.functional_classifications {
            if classification.contains_score(baseline)
                && classification.functional_classification != FunctionalClass::Normal
            {
                return Err(ValidationError::new(format!(
                    "the provided baseline score of {} falls within a non-normal range ('{}'); \
                     baseline scores may not fall within non-normal ranges",
                    baseline, classification.label
                )));
            }
        }
        Ok(())
    }
}

/// Whether two range-based classifications conflict under the documented
/// overlap rule.
fn ranges_conflict(a: &FunctionalClassification, b: &FunctionalClassification) -> bool {
    // `not_specified` classifications are permitted to overlap with anything.
    if a.functional_classification == FunctionalClass::NotSpecified
        || b.functional_classification == FunctionalClass::NotSpecified
    {
        return false;
    }
    let (Some(range_a), Some(range_b)) = (&a.range, &b.range) else {
        return false;
    };

    // Order by lower bound, ties broken by upper bound.
    let (first, second) = if (range_a.lower_bound(), range_a.upper_bound())
        <= (range_b.lower_bound(), range_b.upper_bound())
    {
        (a, b)
    } else {
        (b, a)
    };
    let first_upper = first.range.as_ref().unwrap().upper_bound();
    let second_lower = second.range.as_ref().unwrap().lower_bound();

    if first_upper > second_lower {
        return true;
    }
    first_upper == second_lower && first.inclusive_upper() && second.inclusive_lower()
}

/// Convert a classes table (`variant_urn`, `functional_class`) into a map of
/// class label to distinct variant URNs.
pub fn variant_classification_table_to_map(
    table: &Table,
) -> Result<indexmap::IndexMap<String, Vec<String>>, ValidationError> {
    let variant_col = table
        .column_index_ci(CALIBRATION_VARIANT_COLUMN)
        .ok_or_else(|| {
            ValidationError::new(format!(
                "classes file must define a '{}' column",
                CALIBRATION_VARIANT_COLUMN
            ))
        })?;
    let class_col = table
        .column_index_ci(CALIBRATION_CLASS_COLUMN)
        .ok_or_else(|| {
            ValidationError::new(format!(
                "classes file must define a '{}' column",
                CALIBRATION_CLASS_COLUMN
            ))
        })?;

    let mut classes: indexmap::IndexMap<String, Vec<String>> = indexmap::IndexMap::new();
    for row in 0..table.n_rows() {
        let (Some(variant), Some(class)) =
            (table.value(row, variant_col), table.value(row, class_col))
        else {
            return Err(ValidationError::new(format!(
                "classes file contains a null entry at row {}",
                row
            )));
        };
        let entry = classes.entry(class.to_owned()).or_default();
        if !entry.iter().any(|v| v == variant) {
            entry.push(variant.to_owned());
        }
    }
    Ok(classes)
}
