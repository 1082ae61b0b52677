//! URN assignment: temporary URNs on create, structured URNs on publish.
//!
//! Final URNs follow `urn:mavedb:<8-digit set>-<experiment suffix>-<score set
//! suffix>`; experiment suffixes are bijective base-26 letters (`a`, `b`, ...,
//! `z`, `aa`, ...), with `0` marking the meta-analysis experiment of a set.
//! Variant URNs append `#<n>` with 1-based numbering.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, ValidationError};
use crate::store::StoreData;

static EXPERIMENT_SET_URN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^urn:mavedb:(\d{8})$").unwrap());
static EXPERIMENT_URN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^urn:mavedb:\d{8}-([a-z]+|0)$").unwrap());
static SCORE_SET_URN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^urn:mavedb:\d{8}-(?:[a-z]+|0)-(\d+)$").unwrap());

/// Generate a fresh temporary URN.
pub fn generate_temp_urn() -> String {
    format!("tmp:{}", uuid::Uuid::new_v4())
}

/// Whether a URN is still in the temporary namespace.
pub fn is_temp_urn(urn: &str) -> bool {
    urn.starts_with("tmp:")
}

/// Render an experiment suffix from a 1-based index (bijective base-26).
fn experiment_suffix(mut index: u64) -> String {
    let mut suffix = Vec::new();
    while index > 0 {
        index -= 1;
        suffix.push(b'a' + (index % 26) as u8);
        index /= 26;
    }
    suffix.reverse();
    String::from_utf8(suffix).expect("suffix is ASCII")
}

/// Parse an experiment letter suffix back to its 1-based index.
fn experiment_suffix_index(suffix: &str) -> Option<u64> {
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_lowercase()) {
        return None;
    }
    Some(
        suffix
            .bytes()
            .fold(0u64, |acc, b| acc * 26 + (b - b'a') as u64 + 1),
    )
}

/// Assign the next final experiment set URN.
pub fn generate_experiment_set_urn(data: &StoreData) -> String {
    let next = data
        .experiment_sets
        .values()
        .filter_map(|s| EXPERIMENT_SET_URN_RE.captures(&s.urn))
        .filter_map(|c| c[1].parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    format!("urn:mavedb:{:08}", next)
}

/// Assign the next final experiment URN within an experiment set.
///
/// Meta-analysis experiments share the fixed `0` suffix; all others receive
/// the next letter suffix.
pub fn generate_experiment_urn(
    data: &StoreData,
    experiment_set_id: i64,
    experiment_is_meta_analysis: bool,
) -> Result<String, CoreError> {
    let set_urn = data.experiment_set(experiment_set_id)?.urn.clone();
    if experiment_is_meta_analysis {
        return Ok(format!("{}-0", set_urn));
    }

    let next = data
        .experiments
        .values()
        .filter(|e| e.experiment_set_id == experiment_set_id)
        .filter_map(|e| EXPERIMENT_URN_RE.captures(&e.urn))
        .filter_map(|c| experiment_suffix_index(&c[1]))
        .max()
        .unwrap_or(0)
        + 1;
    Ok(format!("{}-{}", set_urn, experiment_suffix(next)))
}

/// Assign the next final score set URN within an experiment.
pub fn generate_score_set_urn(data: &StoreData, experiment_id: i64) -> Result<String, CoreError> {
    let experiment_urn = data.experiment(experiment_id)?.urn.clone();
    let next = data
        .score_sets
        .values()
        .filter(|s| s.experiment_id == experiment_id)
        .filter_map(|s| SCORE_SET_URN_RE.captures(&s.urn))
        .filter_map(|c| c[1].parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    Ok(format!("{}-{}", experiment_urn, next))
}

/// Renumber every variant URN of a score set to `<score_set_urn>#<n>`,
/// preserving the original 1-based suffix. Idempotent.
pub fn refresh_variant_urns(data: &mut StoreData, score_set_id: i64) -> Result<(), CoreError> {
    let score_set_urn = data.score_set(score_set_id)?.urn.clone();
    let variant_ids: Vec<i64> = data
        .variants
        .values()
        .filter(|v| v.score_set_id == score_set_id)
        .map(|v| v.id)
        .collect();
    for id in variant_ids {
        let variant = data.variant_mut(id)?;
        let suffix = variant
            .urn
            .rsplit_once('#')
            .map(|(_, n)| n.to_owned())
            .ok_or_else(|| {
                CoreError::Internal(format!("variant {} has no URN suffix", variant.urn))
            })?;
        variant.urn = format!("{}#{}", score_set_urn, suffix);
    }
    Ok(())
}

/// Publish a score set: finalize the URNs of its experiment set, experiment,
/// and itself; renumber variants; clear the private flags; stamp the
/// published date.
pub fn publish_score_set(
    data: &mut StoreData,
    score_set_id: i64,
    published_date: chrono::NaiveDate,
) -> Result<(), CoreError> {
    let score_set = data.score_set(score_set_id)?;
    let experiment_id = score_set.experiment_id;

    let experiment = data.experiment(experiment_id).map_err(|_| {
        CoreError::Conflict(format!(
            "score set {} does not belong to an experiment and cannot be published",
            score_set_id
        ))
    })?;
    let experiment_set_id = experiment.experiment_set_id;
    data.experiment_set(experiment_set_id).map_err(|_| {
        CoreError::Conflict(format!(
            "the experiment of score set {} does not belong to an experiment set and cannot \
             be published",
            score_set_id
        ))
    })?;

    if data.variants_for_score_set(score_set_id).is_empty() {
        return Err(CoreError::Validation(ValidationError::new(
            "cannot publish score set without variant scores",
        )));
    }

    // Finalize the experiment set first; child URNs derive from it.
    let experiment_set = data.experiment_set(experiment_set_id)?;
    if experiment_set.private || experiment_set.published_date.is_none() {
        let urn = generate_experiment_set_urn(data);
        let experiment_set = data.experiment_set_mut(experiment_set_id)?;
        experiment_set.urn = urn;
        experiment_set.private = false;
        experiment_set.published_date = Some(published_date);
    }

    let is_meta_analysis = !data.meta_analyzes_score_sets(score_set_id).is_empty();
    let experiment = data.experiment(experiment_id)?;
    if experiment.private || experiment.published_date.is_none() {
        let urn = generate_experiment_urn(data, experiment_set_id, is_meta_analysis)?;
        let experiment = data.experiment_mut(experiment_id)?;
        experiment.urn = urn;
        experiment.private = false;
        experiment.published_date = Some(published_date);
    }

    if is_temp_urn(&data.score_set(score_set_id)?.urn) {
        let urn = generate_score_set_urn(data, experiment_id)?;
        let score_set = data.score_set_mut(score_set_id)?;
        score_set.urn = urn;
    }
    let score_set = data.score_set_mut(score_set_id)?;
    score_set.private = false;
    score_set.published_date = Some(published_date);
    score_set.modification_date = published_date;

    refresh_variant_urns(data, score_set_id)
}
