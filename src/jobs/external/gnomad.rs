//! gnomAD variant linking.

use crate::error::CoreError;
use crate::jobs::manager::{JobManager, JobResultData};
use crate::jobs::AppContext;
use crate::store::annotation::{AnnotationStatusManager, NewAnnotation};
use crate::store::models::{AnnotationStatus, AnnotationType, GnomadVariant};

/// Link gnomAD records to every current mapped variant with a single-variant
/// ClinGen allele id.
///
/// Idempotent: re-running does not duplicate GnomADVariant rows or links.
/// Never touches the score set's mapping state.
pub async fn link_gnomad_variants(
    ctx: AppContext,
    manager: JobManager,
) -> Result<JobResultData, CoreError> {
    let job = manager.get_job().await?;

    manager
        .update_progress(0, 100, "Collecting mapped variants with ClinGen allele ids.")
        .await?;

    // Current mapped variants carrying a usable (non-multi) CAID.
    let candidates: Vec<(i64, i64, String)> = {
        let store = ctx.db.lock().await;
        store
            .current_mapped_variants()
            .iter()
            .filter_map(|m| {
                m.clingen_allele_id
                    .as_ref()
                    .filter(|caid| !caid.contains(','))
                    .map(|caid| (m.id, m.variant_id, caid.clone()))
            })
            .collect()
    };

    if candidates.is_empty() {
        manager
            .update_progress(100, 100, "No mapped variants eligible for gnomAD linking.")
            .await?;
        return Ok(JobResultData::ok_with(serde_json::json!({ "linked": 0 })));
    }

    let caids: Vec<String> = candidates.iter().map(|(_, _, caid)| caid.clone()).collect();
    manager
        .update_progress(
            20,
            100,
            &format!("Querying gnomAD for {} allele ids.", caids.len()),
        )
        .await?;

    // One batch query against the gnomAD source, off the event loop.
    let gnomad = ctx.clients.gnomad.clone();
    let records = tokio::task::spawn_blocking(move || gnomad.variants_for_caids(&caids))
        .await
        .map_err(|e| CoreError::Internal(format!("gnomAD query task failed: {}", e)))??;

    manager
        .update_progress(60, 100, "Linking gnomAD records to mapped variants.")
        .await?;

    let mut linked = 0usize;
    let mut without_match = 0usize;
    {
        let mut store = ctx.db.lock().await;
        for (mapped_variant_id, variant_id, caid) in &candidates {
            let matches: Vec<&crate::clients::gnomad::GnomadRecord> =
                records.iter().filter(|r| &r.caid == caid).collect();

            if matches.is_empty() {
                without_match += 1;
                AnnotationStatusManager::new(&mut store).add_annotation(NewAnnotation {
                    variant_id: *variant_id,
                    annotation_type: AnnotationType::GnomadAlleleFrequency,
                    version: None,
                    status: AnnotationStatus::Skipped,
                    annotation_data: None,
                    error_message: Some(format!("No gnomAD variants matched {}.", caid)),
                    job_run_id: Some(job.id),
                });
                continue;
            }

            let mut identifiers = Vec::with_capacity(matches.len());
            for record in matches {
                let gnomad_variant_id = store.upsert_gnomad_variant(GnomadVariant {
                    id: 0,
                    db_identifier: record.db_identifier.clone(),
                    db_version: record.db_version.clone(),
                    allele_frequency: record.allele_frequency,
                    allele_count: record.allele_count,
                    allele_number: record.allele_number,
                    modification_date: crate::common::today(),
                });
                store.link_gnomad_variant(*mapped_variant_id, gnomad_variant_id);
                identifiers.push(record.db_identifier.clone());
            }
            linked += 1;
            AnnotationStatusManager::new(&mut store).add_annotation(NewAnnotation {
                variant_id: *variant_id,
                annotation_type: AnnotationType::GnomadAlleleFrequency,
                version: None,
                status: AnnotationStatus::Success,
                annotation_data: Some(serde_json::json!({ "db_identifiers": identifiers })),
                error_message: None,
                job_run_id: Some(job.id),
            });
        }
        store.commit();
    }

    manager
        .update_progress(100, 100, "Finished linking gnomAD variants.")
        .await?;
    tracing::info!(linked, without_match, "gnomAD linking finished");

    Ok(JobResultData::ok_with(serde_json::json!({
        "linked": linked,
        "without_match": without_match,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::gnomad::GnomadRecord;
    use crate::jobs::manager::JobOutcome;
    use crate::jobs::test_support::{empty_clients, test_context_with, StubGnomad};
    use crate::jobs::{enqueue_job, AppContext};
    use crate::store::models::{JobFunction, MappedVariant, Variant};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn seed_mapped_variant(ctx: &AppContext, caid: Option<&str>) -> i64 {
        let mut store = ctx.db.lock().await;
        let experiment = store.create_experiment("exp", None, None).unwrap();
        let score_set = store.create_score_set("ss", experiment, None).unwrap();
        let urn = store.score_set(score_set).unwrap().urn.clone();
        let variant_id = store
            .insert_variants(vec![Variant {
                urn: format!("{}#1", urn),
                score_set_id: score_set,
                ..Default::default()
            }])
            .unwrap()[0];
        store.insert_mapped_variant(MappedVariant {
            variant_id,
            current: true,
            clingen_allele_id: caid.map(str::to_owned),
            ..Default::default()
        });
        store.commit();
        variant_id
    }

    fn gnomad_clients(records: Vec<GnomadRecord>) -> crate::clients::ExternalClients {
        let mut clients = empty_clients();
        clients.gnomad = Arc::new(StubGnomad(records));
        clients
    }

    fn record(caid: &str, identifier: &str) -> GnomadRecord {
        GnomadRecord {
            caid: caid.to_owned(),
            db_identifier: identifier.to_owned(),
            db_version: Some("4.1".to_owned()),
            allele_frequency: Some(1.5e-5),
            allele_count: Some(4),
            allele_number: Some(250_000),
        }
    }

    async fn run_linking(ctx: &AppContext) -> JobResultData {
        let job = enqueue_job(
            ctx,
            "gnomad_linking",
            JobFunction::LinkGnomadVariants,
            serde_json::json!({}),
            0,
        )
        .await;
        while ctx.queue.dequeue_job().await.is_some() {}
        crate::jobs::execute_job(ctx, job).await
    }

    #[tokio::test]
    async fn matching_records_are_linked_with_success_status() {
        let ctx = test_context_with(gnomad_clients(vec![record("CA1", "1-100-A-G")]));
        let variant_id = seed_mapped_variant(&ctx, Some("CA1")).await;

        let result = run_linking(&ctx).await;
        assert_eq!(JobOutcome::Ok, result.status);

        let store = ctx.db.lock().await;
        assert_eq!(1, store.gnomad_variants.len());
        assert_eq!(1, store.mapped_variant_gnomad_variants.len());
        let status = store
            .annotation_statuses
            .values()
            .find(|s| s.variant_id == variant_id)
            .unwrap();
        assert_eq!(AnnotationType::GnomadAlleleFrequency, status.annotation_type);
        assert_eq!(AnnotationStatus::Success, status.status);
    }

    #[tokio::test]
    async fn unmatched_caids_are_skipped() {
        let ctx = test_context_with(gnomad_clients(vec![]));
        let variant_id = seed_mapped_variant(&ctx, Some("CA1")).await;

        run_linking(&ctx).await;
        let store = ctx.db.lock().await;
        assert!(store.gnomad_variants.is_empty());
        let status = store
            .annotation_statuses
            .values()
            .find(|s| s.variant_id == variant_id)
            .unwrap();
        assert_eq!(AnnotationStatus::Skipped, status.status);
    }

    #[tokio::test]
    async fn multi_variant_caids_are_not_queried() {
        let ctx = test_context_with(gnomad_clients(vec![record("CA1,CA2", "1-100-A-G")]));
        seed_mapped_variant(&ctx, Some("CA1,CA2")).await;

        let result = run_linking(&ctx).await;
        assert_eq!(JobOutcome::Ok, result.status);
        let store = ctx.db.lock().await;
        assert!(store.gnomad_variants.is_empty());
        assert!(store.annotation_statuses.is_empty());
    }

    #[tokio::test]
    async fn linking_is_idempotent() {
        let ctx = test_context_with(gnomad_clients(vec![record("CA1", "1-100-A-G")]));
        let variant_id = seed_mapped_variant(&ctx, Some("CA1")).await;

        run_linking(&ctx).await;
        run_linking(&ctx).await;

        let store = ctx.db.lock().await;
        assert_eq!(1, store.gnomad_variants.len());
        assert_eq!(1, store.mapped_variant_gnomad_variants.len());
        assert_eq!(
            1,
            store
                .annotation_statuses
                .values()
                .filter(|s| s.variant_id == variant_id && s.current)
                .count()
        );
    }
}
