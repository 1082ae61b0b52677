//! Score calibration lifecycle operations over the domain store.

use crate::calibration::ScoreCalibration;
use crate::common::today;
use crate::error::CoreError;
use crate::store::StoreData;

/// Create a calibration inside the score set identified by URN.
///
/// The calibration is normalized and validated, stamped with audit dates, and
/// flagged `investigator_provided` when the acting user is among the score
/// set's contributors or its creator/modifier.
pub fn create_score_calibration_in_score_set(
    data: &mut StoreData,
    mut calibration: ScoreCalibration,
    score_set_urn: &str,
    user_id: i64,
) -> Result<i64, CoreError> {
    let score_set = data
        .find_score_set_by_urn(score_set_urn)
        .ok_or_else(|| CoreError::NotFound(format!("score set with URN '{}'", score_set_urn)))?;
    let score_set_id = score_set.id;

    calibration.investigator_provided = user_is_investigator(data, score_set_id, user_id)?;
    calibration.score_set_id = score_set_id;
    calibration.creation_date = today();
    calibration.modification_date = today();

    calibration.normalize();
    calibration.validate()?;

    Ok(data.insert_calibration(calibration))
}

/// Replace the mutable attributes and classifications of an existing
/// calibration.
pub fn modify_score_calibration(
    data: &mut StoreData,
    calibration_id: i64,
    update: ScoreCalibration,
    user_id: i64,
) -> Result<(), CoreError> {
    let existing = data.calibration(calibration_id)?;
    let score_set_id = existing.score_set_id;

    let mut updated = ScoreCalibration {
        id: calibration_id,
        urn: existing.urn.clone(),
        score_set_id,
        investigator_provided: user_is_investigator(data, score_set_id, user_id)?,
        creation_date: existing.creation_date,
        modification_date: today(),
        ..update
    };
    updated.normalize();
    updated.validate()?;

    *data.calibration_mut(calibration_id)? = updated;
    Ok(())
}

/// Publish a private calibration.
pub fn publish_score_calibration(
    data: &mut StoreData,
    calibration_id: i64,
) -> Result<(), CoreError> {
    let calibration = data.calibration_mut(calibration_id)?;
    if !calibration.private {
        return Err(CoreError::Conflict(
            "calibration is already published".to_owned(),
        ));
    }
    calibration.private = false;
    calibration.modification_date = today();
    Ok(())
}

/// Promote a calibration to primary for its score set.
///
/// An existing primary calibration blocks promotion unless `force` is set, in
/// which case it is demoted.
pub fn promote_score_calibration_to_primary(
    data: &mut StoreData,
    calibration_id: i64,
    force: bool,
) -> Result<(), CoreError> {
    let calibration = data.calibration(calibration_id)?;
    if calibration.primary {
        return Err(CoreError::Conflict("calibration is already primary".to_owned()));
    }
    if calibration.research_use_only {
        return Err(CoreError::Conflict(
            "cannot promote a research use only calibration to primary".to_owned(),
        ));
    }
    if calibration.private {
        return Err(CoreError::Conflict(
            "cannot promote a private calibration to primary".to_owned(),
        ));
    }
    let score_set_id = calibration.score_set_id;

    let existing_primary: Vec<i64> = data
        .calibrations_for_score_set(score_set_id)
        .iter()
        .filter(|c| c.primary && c.id != calibration_id)
        .map(|c| c.id)
        .collect();
    if !existing_primary.is_empty() && !force {
        return Err(CoreError::Conflict(
            "another primary calibration already exists for this score set; use force to \
             override"
                .to_owned(),
        ));
    }
    for id in existing_primary {
        let demoted = data.calibration_mut(id)?;
        demoted.primary = false;
        demoted.modification_date = today();
    }

    let calibration = data.calibration_mut(calibration_id)?;
    calibration.primary = true;
    calibration.modification_date = today();
    Ok(())
}

/// Demote a primary calibration.
pub fn demote_score_calibration_from_primary(
    data: &mut StoreData,
    calibration_id: i64,
) -> Result<(), CoreError> {
    let calibration = data.calibration_mut(calibration_id)?;
    if !calibration.primary {
        return Err(CoreError::Conflict("calibration is not primary".to_owned()));
    }
    calibration.primary = false;
    calibration.modification_date = today();
    Ok(())
}

/// Delete a non-primary calibration; contained classifications go with it.
pub fn delete_score_calibration(
    data: &mut StoreData,
    calibration_id: i64,
) -> Result<(), CoreError> {
    if data.calibration(calibration_id)?.primary {
        return Err(CoreError::Conflict(
            "cannot delete a primary calibration; demote it first".to_owned(),
        ));
    }
    data.delete_calibration(calibration_id)
}

/// Whether the acting user is an investigator of the score set: one of its
/// contributors, or its creator or last modifier.
fn user_is_investigator(
    data: &StoreData,
    score_set_id: i64,
    user_id: i64,
) -> Result<bool, CoreError> {
    let score_set = data.score_set(score_set_id)?;
    let username = data.user(user_id)?.username.clone();

    if [score_set.created_by, score_set.modified_by]
        .iter()
        .flatten()
        .any(|id| {
            data.users
                .get(id)
                .is_some_and(|u| u.username == username)
        })
    {
        return Ok(true);
    }
    Ok(score_set.contributors.iter().any(|id| {
        data.contributors
            .get(id)
            .is_some_and(|c| c.orcid_id == username)
    }))
}
