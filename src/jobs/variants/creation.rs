//! Creation of variants from uploaded score and count data.

use indexmap::IndexMap;

use crate::error::{CoreError, ValidationError};
use crate::jobs::manager::{JobManager, JobResultData};
use crate::jobs::{enqueue_job, AppContext, DEFAULT_MAX_RETRIES};
use crate::score_sets::{create_variants, create_variants_data};
use crate::store::models::{JobFunction, MappingState, ProcessingErrors, ProcessingState};
use crate::store::Db;
use crate::tabular::Table;
use crate::validation::dataframe::{validate_and_standardize_dataframe_pair, TargetSeqInfo};
use crate::validation::target::validate_target_sequence;

/// Parameters of the variant creation job.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateVariantsParams {
    pub score_set_id: i64,
    pub updater_id: i64,
    /// The uploaded scores file, CSV-encoded.
    pub scores_csv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts_csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_columns_metadata: Option<IndexMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_columns_metadata: Option<IndexMap<String, serde_json::Value>>,
}

/// Persist a terminal processing failure; the job must never leave the score
/// set stuck in `processing`.
async fn persist_processing_failure(
    db: &Db,
    score_set_id: i64,
    message: String,
    detail: Vec<String>,
) {
    let mut store = db.lock().await;
    store.rollback();
    if let Ok(score_set) = store.score_set_mut(score_set_id) {
        score_set.processing_state = ProcessingState::Failed;
        score_set.mapping_state = Some(MappingState::NotAttempted);
        let message = if score_set.num_variants > 0 {
            format!("Update failed, variants were not updated. {}", message)
        } else {
            message
        };
        score_set.processing_errors = Some(ProcessingErrors {
            exception: message,
            detail,
        });
    }
    store.commit();
}

/// Resolve the target sequence datasets are validated against: the single
/// sequence-based target, translated column-wise downstream. Accession-based
/// and multi-target score sets validate variant grammar only.
fn resolve_target_info(
    store: &crate::store::StoreData,
    score_set_id: i64,
) -> Result<Option<TargetSeqInfo>, ValidationError> {
    let targets = store.target_genes_for_score_set(score_set_id);
    let sequences: Vec<_> = targets
        .iter()
        .filter_map(|t| t.target_sequence.as_ref())
        .collect();
    match sequences.as_slice() {
        [single] => {
            let resolved = validate_target_sequence(&single.sequence, single.sequence_type)?;
            Ok(Some(TargetSeqInfo {
                sequence: single.sequence.clone(),
                sequence_type: resolved,
            }))
        }
        _ => Ok(None),
    }
}

/// Create variants for a score set from validated tabular data.
///
/// Every failure branch persists a terminal processing state and commits
/// before the error propagates to the managed lifecycle.
pub async fn create_variants_for_score_set(
    ctx: AppContext,
    manager: JobManager,
) -> Result<JobResultData, CoreError> {
    let job = manager.get_job().await?;
    let params: CreateVariantsParams = serde_json::from_value(job.job_params.clone())
        .map_err(|e| CoreError::Internal(format!("invalid job parameters: {}", e)))?;
    let score_set_id = params.score_set_id;

    manager
        .save_to_context(serde_json::json!({
            "function": "create_variants_for_score_set",
            "score_set_id": score_set_id,
        }))
        .await?;
    manager
        .update_progress(0, 100, "Began processing of score set variants.")
        .await?;

    // Mark the score set as processing before any validation work.
    let target_info = {
        let mut store = ctx.db.lock().await;
        store.user(params.updater_id)?;
        let score_set = store.score_set_mut(score_set_id)?;
        score_set.processing_state = ProcessingState::Processing;
        score_set.mapping_state = Some(MappingState::PendingVariantProcessing);
        score_set.modified_by = Some(params.updater_id);
        score_set.modification_date = crate::common::today();
        store.commit();

        if store.target_genes_for_score_set(score_set_id).is_empty() {
            drop(store);
            let error =
                ValidationError::new("cannot create variants when the score set has no targets");
            tracing::warn!(score_set_id, "no targets are associated with this score set");
            persist_processing_failure(&ctx.db, score_set_id, error.message.clone(), vec![])
                .await;
            return Err(CoreError::Validation(error));
        }

        match resolve_target_info(&store, score_set_id) {
            Ok(info) => info,
            Err(error) => {
                drop(store);
                persist_processing_failure(&ctx.db, score_set_id, error.message.clone(), vec![])
                    .await;
                return Err(CoreError::Validation(error));
            }
        }
    };

    manager
        .update_progress(20, 100, "Validating uploaded data.")
        .await?;

    // Parse and validate the uploaded tables.
    let validation_result = (|| {
        let scores = Table::from_csv_str(&params.scores_csv)?;
        let counts = params
            .counts_csv
            .as_deref()
            .map(Table::from_csv_str)
            .transpose()?;
        validate_and_standardize_dataframe_pair(
            &scores,
            counts.as_ref(),
            params.score_columns_metadata.clone(),
            params.count_columns_metadata.clone(),
            target_info.as_ref(),
        )
    })();

    let validated = match validation_result {
        Ok(validated) => validated,
        Err(error) => {
            tracing::warn!(
                score_set_id,
                error = %error,
                "encountered a validation error while processing variants"
            );
            persist_processing_failure(
                &ctx.db,
                score_set_id,
                error.message.clone(),
                error.triggering_exceptions.clone(),
            )
            .await;
            return Err(CoreError::Validation(error));
        }
    };

    manager
        .update_progress(60, 100, "Creating variant records.")
        .await?;

    let creation_result: Result<usize, CoreError> = {
        let mut store = ctx.db.lock().await;

        // Delete existing variants only after validation succeeds, so a bad
        // update never destroys good data.
        let deleted = store.delete_variants_for_score_set(score_set_id);
        if deleted > 0 {
            tracing::info!(score_set_id, deleted, "deleted existing variants from score set");
        }

        (|| {
            let score_set = store.score_set_mut(score_set_id)?;
            score_set.num_variants = 0;
            score_set.dataset_columns = validated.dataset_columns.clone();

            let variants_data = create_variants_data(
                &validated.scores,
                validated.counts.as_ref(),
                &validated.index_column,
            )
            .map_err(CoreError::Validation)?;
            let created = create_variants(&mut store, score_set_id, variants_data)?;

            let score_set = store.score_set_mut(score_set_id)?;
            score_set.processing_state = ProcessingState::Success;
            score_set.processing_errors = None;
            store.commit();
            Ok(created)
        })()
    };
    let created = match creation_result {
        Ok(created) => created,
        Err(error) => {
            persist_processing_failure(&ctx.db, score_set_id, error.to_string(), vec![]).await;
            return Err(error);
        }
    };

    // Hand the score set to the mapping machinery. Standalone jobs go
    // through the mapping queue and manager gate; pipeline members leave the
    // enqueueing to pipeline coordination.
    if job.pipeline_id.is_none() {
        ctx.queue.push_mapping(score_set_id).await;
        enqueue_job(
            &ctx,
            "variant_mapping",
            JobFunction::VariantMapperManager,
            serde_json::json!({}),
            DEFAULT_MAX_RETRIES,
        )
        .await;
    }
    {
        let mut store = ctx.db.lock().await;
        store.score_set_mut(score_set_id)?.mapping_state = Some(MappingState::Queued);
        store.commit();
    }

    manager
        .update_progress(100, 100, "Finished creating variants in score set.")
        .await?;
    tracing::info!(score_set_id, created, "finished creating variants in score set");

    Ok(JobResultData::ok_with(
        serde_json::json!({ "created_variants": created }),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::jobs::test_support::test_context;
    use crate::store::models::{TargetGene, TargetSequence};
    use crate::validation::target::SequenceType;
    use pretty_assertions::assert_eq;

    pub(crate) const HAPPY_SCORES_CSV: &str = "\
hgvs_nt,hgvs_pro,hgvs_splice,score\n\
g.4A>G,p.Thr2Ala,c.4A>G,1.0\n\
g.5C>G,p.Thr2Arg,c.5C>G,0.5\n\
g.6A>G,p.Thr2=,c.6A>G,1.5\n";

    pub(crate) async fn seed_score_set(ctx: &AppContext) -> (i64, i64) {
        let mut store = ctx.db.lock().await;
        let user = store.create_user("0000-0001-2345-6789", vec![]);
        let experiment = store.create_experiment("exp", None, Some(user)).unwrap();
        let score_set = store.create_score_set("ss", experiment, Some(user)).unwrap();
        store
            .add_target_gene(TargetGene {
                score_set_id: score_set,
                name: "TEST1".to_owned(),
                target_sequence: Some(TargetSequence {
                    sequence: "ATGACA".to_owned(),
                    sequence_type: SequenceType::Dna,
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();
        store.commit();
        (score_set, user)
    }

    pub(crate) async fn enqueue_creation(
        ctx: &AppContext,
        score_set_id: i64,
        updater_id: i64,
        scores_csv: &str,
    ) -> i64 {
        let params = CreateVariantsParams {
            score_set_id,
            updater_id,
            scores_csv: scores_csv.to_owned(),
            counts_csv: None,
            score_columns_metadata: None,
            count_columns_metadata: None,
        };
        enqueue_job(
            ctx,
            "variant_creation",
            JobFunction::CreateVariantsForScoreSet,
            serde_json::to_value(params).unwrap(),
            DEFAULT_MAX_RETRIES,
        )
        .await
    }

    #[tokio::test]
    async fn happy_ingest_creates_variants_and_queues_mapping() {
        let ctx = test_context();
        let (score_set, user) = seed_score_set(&ctx).await;
        let job_id = enqueue_creation(&ctx, score_set, user, HAPPY_SCORES_CSV).await;
        assert_eq!(Some(job_id), ctx.queue.dequeue_job().await);

        let result = crate::jobs::execute_job(&ctx, job_id).await;
        assert_eq!(crate::jobs::manager::JobOutcome::Ok, result.status);

        let store = ctx.db.lock().await;
        let score_set_row = store.score_set(score_set).unwrap();
        assert_eq!(ProcessingState::Success, score_set_row.processing_state);
        assert_eq!(Some(MappingState::Queued), score_set_row.mapping_state);
        assert_eq!(3, score_set_row.num_variants);
        assert_eq!(vec!["score"], score_set_row.dataset_columns.score_columns);

        let urn = score_set_row.urn.clone();
        let mut urns: Vec<String> = store
            .variants_for_score_set(score_set)
            .iter()
            .map(|v| v.urn.clone())
            .collect();
        urns.sort();
        assert_eq!(
            vec![
                format!("{urn}#1"),
                format!("{urn}#2"),
                format!("{urn}#3"),
            ],
            urns
        );

        // The mapping queue holds the score set and a manager job is queued.
        drop(store);
        assert_eq!(1, ctx.queue.pending_mappings().await);
        assert_eq!(1, ctx.queue.pending_jobs().await);
    }

    #[tokio::test]
    async fn prefix_mismatch_fails_with_recorded_errors() {
        let ctx = test_context();
        let (score_set, user) = seed_score_set(&ctx).await;
        let bad_csv = "\
hgvs_nt,hgvs_pro,hgvs_splice,score\n\
n.4A>G,p.Thr2Ala,c.4A>G,1.0\n\
g.5C>G,p.Thr2Arg,c.5C>G,0.5\n\
g.6A>G,p.Thr2=,c.6A>G,1.5\n";
        let job_id = enqueue_creation(&ctx, score_set, user, bad_csv).await;
        ctx.queue.dequeue_job().await;

        let result = crate::jobs::execute_job(&ctx, job_id).await;
        assert_eq!(crate::jobs::manager::JobOutcome::Failed, result.status);

        let store = ctx.db.lock().await;
        let score_set_row = store.score_set(score_set).unwrap();
        assert_eq!(ProcessingState::Failed, score_set_row.processing_state);
        assert_eq!(Some(MappingState::NotAttempted), score_set_row.mapping_state);
        let errors = score_set_row.processing_errors.as_ref().unwrap();
        assert!(errors.exception.contains("inconsistent variant prefixes"));
        assert!(store.variants_for_score_set(score_set).is_empty());
    }

    #[tokio::test]
    async fn failed_update_preserves_existing_variants() {
        let ctx = test_context();
        let (score_set, user) = seed_score_set(&ctx).await;
        let first = enqueue_creation(&ctx, score_set, user, HAPPY_SCORES_CSV).await;
        ctx.queue.dequeue_job().await;
        crate::jobs::execute_job(&ctx, first).await;

        let second = enqueue_creation(&ctx, score_set, user, "hgvs_nt,score\nbogus,1.0\n").await;
        while ctx.queue.dequeue_job().await.is_some() {}
        crate::jobs::execute_job(&ctx, second).await;

        let store = ctx.db.lock().await;
        let score_set_row = store.score_set(score_set).unwrap();
        assert_eq!(ProcessingState::Failed, score_set_row.processing_state);
        let errors = score_set_row.processing_errors.as_ref().unwrap();
        assert!(errors.exception.starts_with("Update failed, variants were not updated."));
        // The previously ingested variants survive the bad update.
        assert_eq!(3, store.variants_for_score_set(score_set).len());
    }

    #[tokio::test]
    async fn score_set_without_targets_is_rejected() {
        let ctx = test_context();
        let (score_set, user) = {
            let mut store = ctx.db.lock().await;
            let user = store.create_user("someone", vec![]);
            let experiment = store.create_experiment("exp", None, Some(user)).unwrap();
            let score_set = store.create_score_set("ss", experiment, Some(user)).unwrap();
            store.commit();
            (score_set, user)
        };
        let job_id = enqueue_creation(&ctx, score_set, user, HAPPY_SCORES_CSV).await;
        ctx.queue.dequeue_job().await;
        let result = crate::jobs::execute_job(&ctx, job_id).await;
        assert_eq!(crate::jobs::manager::JobOutcome::Failed, result.status);

        let store = ctx.db.lock().await;
        assert_eq!(
            ProcessingState::Failed,
            store.score_set(score_set).unwrap().processing_state
        );
    }

    #[tokio::test]
    async fn empty_scores_fail_cleanly() {
        let ctx = test_context();
        let (score_set, user) = seed_score_set(&ctx).await;
        let job_id = enqueue_creation(&ctx, score_set, user, "hgvs_nt,score\n").await;
        ctx.queue.dequeue_job().await;
        let result = crate::jobs::execute_job(&ctx, job_id).await;
        assert_eq!(crate::jobs::manager::JobOutcome::Failed, result.status);

        let store = ctx.db.lock().await;
        let errors = store
            .score_set(score_set)
            .unwrap()
            .processing_errors
            .clone()
            .unwrap();
        assert!(errors.exception.contains("must not be empty"));
    }
}
