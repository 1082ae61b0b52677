//! Per-variant classification lookup.

use indexmap::IndexMap;

use crate::calibration::{FunctionalClassification, ScoreCalibration};
use crate::store::models::Variant;
use crate::store::StoreData;

/// Return the variants of the calibration's score set matched by a
/// functional classification.
///
/// Class-based classifications match by URN membership in `variant_classes`;
/// range-based classifications match by score containment. Variants with a
/// missing or non-numeric score never match a range. The `use_pushdown` flag
/// selects between the store-predicate path and the in-memory fallback; the
/// two preserve identical semantics.
pub fn variants_for_functional_classification<'a>(
    data: &'a StoreData,
    calibration: &ScoreCalibration,
    classification: &FunctionalClassification,
    variant_classes: Option<&IndexMap<String, Vec<String>>>,
    use_pushdown: bool,
) -> Vec<&'a Variant> {
    let score_set_id = calibration.score_set_id;

    if use_pushdown {
        if let Some(predicate) = pushdown_predicate(classification, variant_classes) {
            return data
                .variants
                .values()
                .filter(|v| v.score_set_id == score_set_id)
                .filter(|v| predicate(v))
                .collect();
        }
        // No usable classification mechanism.
        if classification.range.is_none() {
            return Vec::new();
        }
    }

    // In-memory path.
    data.variants
        .values()
        .filter(|v| v.score_set_id == score_set_id)
        .filter(|v| {
            if let (Some(classes), Some(class)) = (variant_classes, &classification.class) {
                classes
                    .get(class)
                    .is_some_and(|urns| urns.iter().any(|u| u == &v.urn))
            } else if classification.range.is_some() {
                v.data
                    .score()
                    .is_some_and(|score| classification.contains_score(score))
            } else {
                false
            }
        })
        .collect()
}

/// Build a single predicate over variants from the classification, mirroring
/// the database-pushdown condition set.
fn pushdown_predicate<'p>(
    classification: &'p FunctionalClassification,
    variant_classes: Option<&'p IndexMap<String, Vec<String>>>,
) -> Option<Box<dyn Fn(&Variant) -> bool + 'p>> {
    if let (Some(classes), Some(class)) = (variant_classes, &classification.class) {
        let urns = classes.get(class).cloned().unwrap_or_default();
        return Some(Box::new(move |v: &Variant| {
            urns.iter().any(|u| u == &v.urn)
        }));
    }

    let range = classification.range.as_ref()?;
    let lower = range.lower_bound();
    let upper = range.upper_bound();
    let inclusive_lower = classification.inclusive_lower();
    let inclusive_upper = classification.inclusive_upper();
    Some(Box::new(move |v: &Variant| {
        let Some(score) = v.data.score() else {
            return false;
        };
        // Conditions for infinite ends are omitted, as in the SQL path.
        if lower.is_finite() && !(if inclusive_lower { score >= lower } else { score > lower }) {
            return false;
        }
        if upper.is_finite() && !(if inclusive_upper { score <= upper } else { score < upper }) {
            return false;
        }
        true
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{FunctionalClass, ScoreRange};
    use crate::store::models::{Variant, VariantData};
    use pretty_assertions::assert_eq;

    fn store_with_scores(scores: &[(&str, Option<f64>)]) -> (StoreData, ScoreCalibration) {
        let mut data = StoreData::default();
        let experiment = data.create_experiment("exp", None, None).unwrap();
        let score_set = data.create_score_set("ss", experiment, None).unwrap();
        let variants = scores
            .iter()
            .map(|(urn, score)| {
                let mut score_data = serde_json::Map::new();
                score_data.insert(
                    "score".to_owned(),
                    match score {
                        Some(s) => serde_json::json!(s),
                        None => serde_json::Value::Null,
                    },
                );
                Variant {
                    urn: (*urn).to_owned(),
                    score_set_id: score_set,
                    data: VariantData {
                        score_data,
                        ..Default::default()
                    },
                    ..Default::default()
                }
            })
            .collect();
        data.insert_variants(variants).unwrap();
        let calibration = ScoreCalibration {
            score_set_id: score_set,
            ..Default::default()
        };
        (data, calibration)
    }

    fn range_classification(lower: Option<f64>, upper: Option<f64>) -> FunctionalClassification {
        FunctionalClassification {
            label: "r".to_owned(),
            functional_classification: FunctionalClass::Normal,
            range: Some(ScoreRange::new(lower, upper)),
            ..Default::default()
        }
    }

    #[rstest::rstest]
    #[case(true)]
    #[case(false)]
    fn range_lookup_matches_contained_scores(#[case] use_pushdown: bool) {
        let (data, calibration) = store_with_scores(&[
            ("tmp:x#1", Some(0.0)),
            ("tmp:x#2", Some(0.5)),
            ("tmp:x#3", Some(1.0)),
            ("tmp:x#4", None),
        ]);
        let classification = range_classification(Some(0.0), Some(1.0));
        let matched: Vec<&str> = variants_for_functional_classification(
            &data,
            &calibration,
            &classification,
            None,
            use_pushdown,
        )
        .iter()
        .map(|v| v.urn.as_str())
        .collect();
        // [0.0, 1.0) by default: inclusive lower, exclusive upper; null
        // scores never match.
        assert_eq!(vec!["tmp:x#1", "tmp:x#2"], matched);
    }

    #[rstest::rstest]
    #[case(true)]
    #[case(false)]
    fn unbounded_range_matches_all_scored_variants(#[case] use_pushdown: bool) {
        let (data, calibration) =
            store_with_scores(&[("tmp:x#1", Some(-100.0)), ("tmp:x#2", None)]);
        let classification = range_classification(None, None);
        let matched = variants_for_functional_classification(
            &data,
            &calibration,
            &classification,
            None,
            use_pushdown,
        );
        assert_eq!(1, matched.len());
    }

    #[rstest::rstest]
    #[case(true)]
    #[case(false)]
    fn class_lookup_matches_by_urn(#[case] use_pushdown: bool) {
        let (data, calibration) =
            store_with_scores(&[("tmp:x#1", Some(0.5)), ("tmp:x#2", Some(0.5))]);
        let classification = FunctionalClassification {
            label: "c".to_owned(),
            class: Some("low".to_owned()),
            ..Default::default()
        };
        let mut classes = IndexMap::new();
        classes.insert("low".to_owned(), vec!["tmp:x#2".to_owned()]);
        let matched: Vec<&str> = variants_for_functional_classification(
            &data,
            &calibration,
            &classification,
            Some(&classes),
            use_pushdown,
        )
        .iter()
        .map(|v| v.urn.as_str())
        .collect();
        assert_eq!(vec!["tmp:x#2"], matched);
    }

    #[test]
    fn classification_without_mechanism_matches_nothing() {
        let (data, calibration) = store_with_scores(&[("tmp:x#1", Some(0.5))]);
        let classification = FunctionalClassification {
            label: "empty".to_owned(),
            ..Default::default()
        };
        for use_pushdown in [true, false] {
            assert!(variants_for_functional_classification(
                &data,
                &calibration,
                &classification,
                None,
                use_pushdown,
            )
            .is_empty());
        }
    }

    #[test]
    fn pushdown_and_in_memory_paths_agree() {
        let (data, calibration) = store_with_scores(&[
            ("tmp:x#1", Some(-1.0)),
            ("tmp:x#2", Some(0.0)),
            ("tmp:x#3", Some(0.25)),
            ("tmp:x#4", Some(1.0)),
            ("tmp:x#5", None),
        ]);
        let mut classification = range_classification(Some(0.0), Some(1.0));
        classification.inclusive_lower_bound = Some(false);
        classification.inclusive_upper_bound = Some(true);

        let pushdown: Vec<&str> = variants_for_functional_classification(
            &data,
            &calibration,
            &classification,
            None,
            true,
        )
        .iter()
        .map(|v| v.urn.as_str())
        .collect();
        let in_memory: Vec<&str> = variants_for_functional_classification(
            &data,
            &calibration,
            &classification,
            None,
            false,
        )
        .iter()
        .map(|v| v.urn.as_str())
        .collect();
        assert_eq!(pushdown, in_memory);
        assert_eq!(vec!["tmp:x#3", "tmp:x#4"], pushdown);
    }
}
