//! VRS variant mapping jobs and the mapper manager gate.

use std::sync::Arc;

use crate::clients::vrs::VrsMappingResults;
use crate::error::CoreError;
use crate::jobs::manager::{JobManager, JobResultData};
use crate::jobs::{enqueue_job, AppContext, DEFAULT_MAX_RETRIES};
use crate::store::annotation::{AnnotationStatusManager, NewAnnotation};
use crate::store::models::{
    AnnotationStatus, AnnotationType, JobFunction, JobStatus, MappedVariant, MappingState,
};
use crate::store::Db;

/// Maximum number of mapping jobs in flight per worker.
pub const MAPPING_PARALLELISM_CAP: usize = 1;

/// Parameters of the variant mapping job.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MapVariantsParams {
    pub score_set_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updater_id: Option<i64>,
}

/// Extract the assay-level HGVS expression from a post-mapped VRS payload.
pub fn get_hgvs_from_post_mapped(post_mapped: &serde_json::Value) -> Option<String> {
    post_mapped
        .pointer("/expressions/0/value")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

async fn persist_mapping_failure(db: &Db, score_set_id: i64, message: Option<String>) {
    let mut store = db.lock().await;
    store.rollback();
    if let Ok(score_set) = store.score_set_mut(score_set_id) {
        score_set.mapping_state = Some(MappingState::Failed);
        if score_set.mapping_errors.is_none() {
            score_set.mapping_errors = message
                .map(|message| serde_json::json!({ "error_message": message }));
        }
    }
    store.commit();
}

/// Map all variants of a score set through the VRS mapping service.
pub async fn map_variants_for_score_set(
    ctx: AppContext,
    manager: JobManager,
) -> Result<JobResultData, CoreError> {
    let job = manager.get_job().await?;
    let params: MapVariantsParams = serde_json::from_value(job.job_params.clone())
        .map_err(|e| CoreError::Internal(format!("invalid job parameters: {}", e)))?;
    let score_set_id = params.score_set_id;

    manager
        .save_to_context(serde_json::json!({
            "function": "map_variants_for_score_set",
            "score_set_id": score_set_id,
        }))
        .await?;
    manager
        .update_progress(0, 100, "Starting variant mapping job.")
        .await?;

    // Prepare the score set for mapping.
    let urn = {
        let mut store = ctx.db.lock().await;
        let score_set = store.score_set_mut(score_set_id)?;
        score_set.mapping_state = Some(MappingState::Processing);
        score_set.mapping_errors = None;
        score_set.modification_date = crate::common::today();
        if let Some(updater_id) = params.updater_id {
            score_set.modified_by = Some(updater_id);
        }
        let urn = score_set.urn.clone();
        store.commit();
        urn
    };

    manager
        .update_progress(30, 100, "Mapping variants using VRS mapping service.")
        .await?;

    // The mapping call is CPU- and network-heavy; keep it off the loop.
    let vrs = ctx.clients.vrs.clone();
    let mapping_urn = urn.clone();
    let mapping_results: Result<VrsMappingResults, CoreError> =
        tokio::task::spawn_blocking(move || vrs.map_score_set(&mapping_urn))
            .await
            .map_err(|e| CoreError::Internal(format!("mapping task failed: {}", e)))?;

    let mapping_results = match mapping_results {
        Ok(results) => results,
        Err(error) => {
            // Unexpected upstream failure; eligible for retry.
            let message = format!(
                "Encountered an unexpected error while mapping variants. This job will be \
                 retried up to {} times (this was attempt {}).",
                job.max_retries, job.retry_count
            );
            persist_mapping_failure(&ctx.db, score_set_id, Some(message)).await;
            manager
                .update_progress(100, 100, "Variant mapping failed due to an unexpected error.")
                .await?;
            return Err(error);
        }
    };

    manager
        .update_progress(80, 100, "Processing mapped variants.")
        .await?;

    // Check our assumptions about the mapping results.
    if mapping_results.mapped_scores.is_empty()
        && mapping_results.reference_sequences.is_empty()
        && mapping_results.mapped_date_utc.is_none()
    {
        let message = "Mapping results were not returned from VRS mapping service.".to_owned();
        persist_mapping_failure(&ctx.db, score_set_id, Some(message.clone())).await;
        return Err(CoreError::NonexistentMappingResults(message));
    }
    if mapping_results.mapped_scores.is_empty() {
        let message = mapping_results
            .error_message
            .clone()
            .unwrap_or_else(|| "No variants were mapped for this score set.".to_owned());
        persist_mapping_failure(&ctx.db, score_set_id, Some(message)).await;
        return Err(CoreError::NonexistentMappingScores(
            "No variants were mapped for this score set.".to_owned(),
        ));
    }
    if mapping_results.reference_sequences.is_empty() {
        let message = "Reference metadata missing from mapping results.".to_owned();
        persist_mapping_failure(&ctx.db, score_set_id, Some(message.clone())).await;
        return Err(CoreError::NonexistentMappingReference(message));
    }

    let mapped_date = mapping_results.mapped_date();
    let total_variants = mapping_results.mapped_scores.len();
    let mut successful_mapped_variants = 0usize;

    let persist_result: Result<(), CoreError> = {
        let mut store = ctx.db.lock().await;
        let store = &mut store;
        (|| {
            // Persist per-target reference metadata and mapped HGNC names.
            for (target_name, reference) in &mapping_results.reference_sequences {
                let target_id = store
                    .target_genes_for_score_set(score_set_id)
                    .iter()
                    .find(|t| t.name == *target_name)
                    .map(|t| t.id)
                    .ok_or_else(|| {
                        CoreError::Internal(format!(
                            "target gene {} not found for score set {}",
                            target_name, urn
                        ))
                    })?;

                let mut pre_mapped_metadata = serde_json::Map::new();
                let mut post_mapped_metadata = serde_json::Map::new();
                if let Some(gene_info) = &reference.gene_info {
                    if let Some(method) = &gene_info.selection_method {
                        post_mapped_metadata.insert(
                            "hgnc_name_selection_method".to_owned(),
                            serde_json::json!(method),
                        );
                    }
                }
                for (layer, sequences) in &reference.layers {
                    if let Some(computed) = &sequences.computed_reference_sequence {
                        pre_mapped_metadata.insert(layer.clone(), computed.clone());
                    }
                    if let Some(mapped) = &sequences.mapped_reference_sequence {
                        post_mapped_metadata.insert(layer.clone(), mapped.clone());
                    }
                }

                let target = store.target_gene_mut(target_id)?;
                if let Some(gene_info) = &reference.gene_info {
                    target.mapped_hgnc_name = gene_info.hgnc_symbol.clone();
                }
                target.pre_mapped_metadata = Some(serde_json::Value::Object(pre_mapped_metadata));
                target.post_mapped_metadata = Some(serde_json::Value::Object(post_mapped_metadata));
            }

            // Insert mapped variants, retiring previous current rows.
            for mapped_score in &mapping_results.mapped_scores {
                let variant_id = store
                    .find_variant_by_urn(&mapped_score.mavedb_id)
                    .map(|v| v.id)
                    .ok_or_else(|| {
                        CoreError::Internal(format!(
                            "variant {} not found for mapped score",
                            mapped_score.mavedb_id
                        ))
                    })?;

                store.retire_current_mapped_variants(variant_id);

                let mapping_was_successful =
                    mapped_score.pre_mapped.is_some() && mapped_score.post_mapped.is_some();
                if mapping_was_successful {
                    successful_mapped_variants += 1;
                }

                store.insert_mapped_variant(MappedVariant {
                    id: 0,
                    variant_id,
                    pre_mapped: mapped_score.pre_mapped.clone(),
                    post_mapped: mapped_score.post_mapped.clone(),
                    vrs_version: mapped_score.vrs_version.clone(),
                    mapping_api_version: mapping_results.dcd_mapping_version.clone(),
                    mapped_date,
                    modification_date: crate::common::today(),
                    current: true,
                    clingen_allele_id: None,
                    error_message: mapped_score.error_message.clone(),
                });

                let annotation_data = serde_json::json!({
                    "error_message": mapped_score.error_message,
                    "job_run_id": job.id,
                    "success_data": {
                        "mapped_assay_level_hgvs": mapped_score
                            .post_mapped
                            .as_ref()
                            .and_then(get_hgvs_from_post_mapped),
                    },
                });
                AnnotationStatusManager::new(store).add_annotation(NewAnnotation {
                    variant_id,
                    annotation_type: AnnotationType::VrsMapping,
                    version: mapped_score.vrs_version.clone(),
                    status: if mapping_was_successful {
                        AnnotationStatus::Success
                    } else {
                        AnnotationStatus::Failed
                    },
                    annotation_data: Some(annotation_data),
                    error_message: mapped_score.error_message.clone(),
                    job_run_id: Some(job.id),
                });
            }

            let score_set = store.score_set_mut(score_set_id)?;
            score_set.mapping_state = Some(if successful_mapped_variants == 0 {
                score_set.mapping_errors =
                    Some(serde_json::json!({ "error_message": "All variants failed to map." }));
                MappingState::Failed
            } else if successful_mapped_variants < total_variants {
                MappingState::Incomplete
            } else {
                MappingState::Complete
            });
            store.commit();
            Ok(())
        })()
    };
    if let Err(error) = persist_result {
        persist_mapping_failure(&ctx.db, score_set_id, Some(error.to_string())).await;
        return Err(error);
    }

    manager
        .update_progress(100, 100, "Finished processing mapped variants.")
        .await?;

    if successful_mapped_variants == 0 {
        return Err(CoreError::NoMappedVariants(
            "No variants were successfully mapped.".to_owned(),
        ));
    }

    tracing::info!(
        score_set_id,
        successful_mapped_variants,
        total_variants,
        "variant mapping job completed successfully"
    );
    Ok(JobResultData::ok_with(serde_json::json!({
        "successful_mapped_variants": successful_mapped_variants,
        "total_variants": total_variants,
    })))
}

/// Concurrency gate over the mapping queue: enqueues per-score-set mapping
/// jobs subject to the parallelism cap.
pub async fn variant_mapper_manager(
    ctx: AppContext,
    manager: JobManager,
) -> Result<JobResultData, CoreError> {
    let running_mappings = {
        let store = ctx.db.lock().await;
        store
            .job_runs
            .values()
            .filter(|j| {
                j.job_function == JobFunction::MapVariantsForScoreSet
                    && j.status == JobStatus::Running
            })
            .count()
    };

    if running_mappings >= MAPPING_PARALLELISM_CAP {
        // Defer: leave the mapping queue untouched and try again later.
        let job = manager.get_job().await?;
        enqueue_job(
            &ctx,
            &job.job_type,
            JobFunction::VariantMapperManager,
            serde_json::json!({}),
            DEFAULT_MAX_RETRIES,
        )
        .await;
        return Ok(JobResultData::ok_with(
            serde_json::json!({ "deferred": true }),
        ));
    }

    match ctx.queue.pop_mapping().await {
        Some(score_set_id) => {
            let params = MapVariantsParams {
                score_set_id,
                updater_id: None,
            };
            let job_id = enqueue_job(
                &ctx,
                "variant_mapping",
                JobFunction::MapVariantsForScoreSet,
                serde_json::to_value(params)
                    .map_err(|e| CoreError::Internal(e.to_string()))?,
                DEFAULT_MAX_RETRIES,
            )
            .await;
            tracing::info!(score_set_id, job_id, "queued variant mapping job");
            Ok(JobResultData::ok_with(
                serde_json::json!({ "queued_score_set": score_set_id }),
            ))
        }
        None => Ok(JobResultData::ok_with(
            serde_json::json!({ "queued_score_set": null }),
        )),
    }
}

/// Convenience used by tests and operators: an `Arc` clone of the VRS client
/// trait object.
pub type SharedVrsClient = Arc<dyn crate::clients::vrs::VrsMapperClient>;
