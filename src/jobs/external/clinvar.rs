//! ClinVar clinical control refresh.

use crate::clients::clinvar::parse_variant_summary;
use crate::error::{CoreError, ValidationError};
use crate::jobs::manager::{JobManager, JobResultData};
use crate::jobs::AppContext;
use crate::store::annotation::{AnnotationStatusManager, NewAnnotation};
use crate::store::models::{AnnotationStatus, AnnotationType, ClinicalControl};

/// The earliest archived variant_summary month.
const EARLIEST_ARCHIVE: (i32, u32) = (2015, 2);

/// Parameters of the ClinVar control refresh job.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RefreshClinvarControlsParams {
    pub year: i32,
    pub month: u32,
}

/// Validate the archive month requested for a refresh.
pub fn validate_archive_month(year: i32, month: u32) -> Result<(), ValidationError> {
    if !(1..=12).contains(&month) {
        return Err(ValidationError::new(format!(
            "month must be between 1 and 12, got {}",
            month
        )));
    }
    if (year, month) < EARLIEST_ARCHIVE {
        return Err(ValidationError::new(format!(
            "no ClinVar variant_summary archive exists before {}-{:02}",
            EARLIEST_ARCHIVE.0, EARLIEST_ARCHIVE.1
        )));
    }
    Ok(())
}

/// Refresh ClinVar clinical controls for every current mapped variant with a
/// ClinGen allele id, from the archived variant_summary of one month.
///
/// Idempotent: re-running produces one current CLINVAR_CONTROL annotation
/// status per variant and one ClinicalControl per VCV. Never touches the
/// score set's mapping state.
pub async fn refresh_clinvar_controls(
    ctx: AppContext,
    manager: JobManager,
) -> Result<JobResultData, CoreError> {
    let job = manager.get_job().await?;
    let params: RefreshClinvarControlsParams = serde_json::from_value(job.job_params.clone())
        .map_err(|e| CoreError::Internal(format!("invalid job parameters: {}", e)))?;
    validate_archive_month(params.year, params.month)?;
    let db_version = format!("{:02}_{}", params.month, params.year);

    manager
        .update_progress(0, 100, "Downloading ClinVar variant_summary archive.")
        .await?;

    // Download and decompress off the event loop; the TSV is large.
    let clinvar = ctx.clients.clinvar.clone();
    let (year, month) = (params.year, params.month);
    let summary = tokio::task::spawn_blocking(move || {
        let bytes = clinvar.fetch_variant_summary(year, month)?;
        parse_variant_summary(&bytes)
    })
    .await
    .map_err(|e| CoreError::Internal(format!("ClinVar fetch task failed: {}", e)))??;

    // Collect the mapped variants to annotate before releasing the store.
    let candidates: Vec<(i64, i64, Option<String>)> = {
        let store = ctx.db.lock().await;
        store
            .current_mapped_variants()
            .iter()
            .map(|m| (m.id, m.variant_id, m.clingen_allele_id.clone()))
            .collect()
    };
    let total = candidates.len();
    manager
        .update_progress(10, 100, &format!("Annotating {} mapped variants.", total))
        .await?;

    let mut annotated = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for (done, (mapped_variant_id, variant_id, caid)) in candidates.into_iter().enumerate() {
        let Some(caid) = caid else {
            skipped += 1;
            add_control_annotation(
                &ctx,
                variant_id,
                &db_version,
                AnnotationStatus::Skipped,
                None,
                Some("Mapped variant has no ClinGen allele id.".to_owned()),
                job.id,
            )
            .await?;
            continue;
        };

        // Comma-separated CAIDs describe multi-variant alleles.
        if caid.contains(',') {
            skipped += 1;
            add_control_annotation(
                &ctx,
                variant_id,
                &db_version,
                AnnotationStatus::Skipped,
                None,
                Some("Multi-variant ClinGen allele ids are not supported.".to_owned()),
                job.id,
            )
            .await?;
            continue;
        }

        let clingen = ctx.clients.clingen.clone();
        let lookup_caid = caid.clone();
        let clinvar_allele_id = tokio::task::spawn_blocking(move || {
            clingen.get_associated_clinvar_allele_id(&lookup_caid)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("ClinGen lookup task failed: {}", e)))?;

        let clinvar_allele_id = match clinvar_allele_id {
            Ok(Some(allele_id)) => allele_id,
            Ok(None) => {
                skipped += 1;
                add_control_annotation(
                    &ctx,
                    variant_id,
                    &db_version,
                    AnnotationStatus::Skipped,
                    None,
                    Some(format!("No ClinVar allele is associated with {}.", caid)),
                    job.id,
                )
                .await?;
                continue;
            }
            Err(error) => {
                failed += 1;
                add_control_annotation(
                    &ctx,
                    variant_id,
                    &db_version,
                    AnnotationStatus::Failed,
                    None,
                    Some(format!("ClinGen allele registry lookup failed: {}", error)),
                    job.id,
                )
                .await?;
                continue;
            }
        };

        let Some(record) = summary.get(&clinvar_allele_id) else {
            skipped += 1;
            add_control_annotation(
                &ctx,
                variant_id,
                &db_version,
                AnnotationStatus::Skipped,
                None,
                Some(format!(
                    "No ClinVar data found for allele {} in the {} archive.",
                    clinvar_allele_id, db_version
                )),
                job.id,
            )
            .await?;
            continue;
        };

        // Upsert the control and link it; both operations are idempotent.
        let vcv = record.vcv_accession();
        {
            let mut store = ctx.db.lock().await;
            let control_id = store.upsert_clinical_control(ClinicalControl {
                id: 0,
                db_name: "ClinVar".to_owned(),
                db_identifier: vcv.clone(),
                db_version: db_version.clone(),
                clinical_significance: Some(record.clinical_significance.clone()),
                clinical_review_status: Some(record.review_status.clone()),
                gene_symbol: Some(record.gene_symbol.clone()),
                modification_date: crate::common::today(),
            });
            store.link_clinical_control(mapped_variant_id, control_id);
            store.commit();
        }
        annotated += 1;
        add_control_annotation(
            &ctx,
            variant_id,
            &db_version,
            AnnotationStatus::Success,
            Some(serde_json::json!({
                "db_identifier": vcv,
                "clinical_significance": record.clinical_significance,
                "clinical_review_status": record.review_status,
                "gene_symbol": record.gene_symbol,
            })),
            None,
            job.id,
        )
        .await?;

        manager
            .update_progress(
                10 + (90 * (done as i64 + 1) / total.max(1) as i64),
                100,
                "Annotating mapped variants.",
            )
            .await?;
    }

    manager
        .update_progress(100, 100, "Finished refreshing ClinVar controls.")
        .await?;
    tracing::info!(annotated, skipped, failed, "ClinVar control refresh finished");

    Ok(JobResultData::ok_with(serde_json::json!({
        "annotated": annotated,
        "skipped": skipped,
        "failed": failed,
    })))
}

#[allow(clippy::too_many_arguments)]
async fn add_control_annotation(
    ctx: &AppContext,
    variant_id: i64,
    db_version: &str,
    status: AnnotationStatus,
    annotation_data: Option<serde_json::Value>,
    error_message: Option<String>,
    job_run_id: i64,
) -> Result<(), CoreError> {
    let mut store = ctx.db.lock().await;
    AnnotationStatusManager::new(&mut store).add_annotation(NewAnnotation {
        variant_id,
        annotation_type: AnnotationType::ClinvarControl,
        version: Some(db_version.to_owned()),
        status,
        annotation_data,
        error_message,
        job_run_id: Some(job_run_id),
    });
    store.commit();
    Ok(())
}
