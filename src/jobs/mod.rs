//! The worker: job queue, managed lifecycle, pipelines, and the job
//! implementations.

pub mod external;
pub mod manager;
pub mod pipeline;
pub mod queue;
#[cfg(test)]
mod scenarios;
pub mod variants;

use std::sync::Arc;

use crate::clients::ExternalClients;
use crate::jobs::manager::{run_managed, JobResultData};
use crate::jobs::pipeline::run_with_pipeline;
use crate::jobs::queue::JobQueue;
use crate::store::models::JobFunction;
use crate::store::Db;

/// Default retry budget for retriable error classes.
pub const DEFAULT_MAX_RETRIES: i64 = 3;

/// Explicit application context handed to jobs; jobs receive their store and
/// queue through this, never via module-level singletons.
#[derive(Clone)]
pub struct AppContext {
    pub db: Db,
    pub queue: Arc<JobQueue>,
    pub clients: ExternalClients,
}

/// Create a job run record and enqueue it for execution; returns the job id.
pub async fn enqueue_job(
    ctx: &AppContext,
    job_type: &str,
    job_function: JobFunction,
    job_params: serde_json::Value,
    max_retries: i64,
) -> i64 {
    let job_id = {
        let mut store = ctx.db.lock().await;
        let id = store.create_job_run(job_type, job_function, job_params, max_retries, None);
        store.commit();
        id
    };
    ctx.queue.enqueue_job(job_id).await;
    job_id
}

/// Execute one job run through its managed lifecycle.
///
/// Routing is a typed dispatch on the closed job function enumeration. All
/// jobs that may belong to pipelines run under pipeline management (a no-op
/// for standalone jobs); the mapper manager gate runs under plain job
/// management.
pub async fn execute_job(ctx: &AppContext, job_id: i64) -> JobResultData {
    let function = {
        let store = ctx.db.lock().await;
        match store.job_run(job_id) {
            Ok(job) => job.job_function,
            Err(e) => {
                tracing::error!(job_id, error = %e, "cannot execute job without a record");
                return JobResultData {
                    status: manager::JobOutcome::Failed,
                    data: serde_json::json!({}),
                    exception: Some(manager::ExceptionDetails {
                        r#type: e.class_name().to_owned(),
                        message: e.to_string(),
                        traceback: None,
                    }),
                };
            }
        }
    };

    match function {
        JobFunction::CreateVariantsForScoreSet => {
            let ctx_clone = ctx.clone();
            run_with_pipeline(ctx, job_id, move |m| {
                variants::creation::create_variants_for_score_set(ctx_clone, m)
            })
            .await
        }
        JobFunction::MapVariantsForScoreSet => {
            let ctx_clone = ctx.clone();
            run_with_pipeline(ctx, job_id, move |m| {
                variants::mapping::map_variants_for_score_set(ctx_clone, m)
            })
            .await
        }
        JobFunction::VariantMapperManager => {
            let ctx_clone = ctx.clone();
            run_managed(ctx, job_id, move |m| {
                variants::mapping::variant_mapper_manager(ctx_clone, m)
            })
            .await
        }
        JobFunction::RefreshClinvarControls => {
            let ctx_clone = ctx.clone();
            run_with_pipeline(ctx, job_id, move |m| {
                external::clinvar::refresh_clinvar_controls(ctx_clone, m)
            })
            .await
        }
        JobFunction::LinkGnomadVariants => {
            let ctx_clone = ctx.clone();
            run_with_pipeline(ctx, job_id, move |m| {
                external::gnomad::link_gnomad_variants(ctx_clone, m)
            })
            .await
        }
    }
}

/// The worker loop: pull jobs from the queue and execute them.
///
/// With `drain_and_exit`, the loop stops once the queue is empty; otherwise
/// it polls at the given interval.
pub async fn run_worker(
    ctx: &AppContext,
    poll_interval: std::time::Duration,
    drain_and_exit: bool,
) -> Result<(), anyhow::Error> {
    loop {
        match ctx.queue.dequeue_job().await {
            Some(job_id) => {
                tracing::info!(job_id, "executing job");
                let result = execute_job(ctx, job_id).await;
                tracing::info!(job_id, status = %result.status, "job finished");
            }
            None if drain_and_exit => break,
            None => tokio::time::sleep(poll_interval).await,
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Stub clients and context builders shared by the worker tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::clients::clingen::ClinGenClient;
    use crate::clients::clinvar::ClinVarArchiveClient;
    use crate::clients::gnomad::{GnomadRecord, GnomadSourceClient};
    use crate::clients::vrs::{VrsMapperClient, VrsMappingResults};
    use crate::error::CoreError;
    use crate::identifiers::{PublicationClients, PublicationFetcher, PublicationRecord};
    use crate::store::Store;

    /// VRS stub replaying a scripted sequence of responses.
    pub struct StubVrs {
        responses: Mutex<VecDeque<Result<VrsMappingResults, CoreError>>>,
    }

    impl StubVrs {
        pub fn new(responses: Vec<Result<VrsMappingResults, CoreError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    impl VrsMapperClient for StubVrs {
        fn map_score_set(&self, _urn: &str) -> Result<VrsMappingResults, CoreError> {
            self.responses
                .lock()
                .expect("stub lock")
                .pop_front()
                .unwrap_or_else(|| Ok(VrsMappingResults::default()))
        }
    }

    /// ClinGen stub resolving CAIDs from a fixed map; unknown CAIDs resolve
    /// to no ClinVar allele, CAIDs in `failing` error out.
    #[derive(Default)]
    pub struct StubClinGen {
        pub alleles: indexmap::IndexMap<String, String>,
        pub failing: Vec<String>,
    }

    impl ClinGenClient for StubClinGen {
        fn get_associated_clinvar_allele_id(
            &self,
            caid: &str,
        ) -> Result<Option<String>, CoreError> {
            if self.failing.iter().any(|c| c == caid) {
                return Err(CoreError::Transport(format!(
                    "ClinGen lookup failed for {}",
                    caid
                )));
            }
            Ok(self.alleles.get(caid).cloned())
        }
    }

    /// ClinVar archive stub serving fixed gzip bytes.
    pub struct StubClinVarArchive(pub Vec<u8>);

    impl ClinVarArchiveClient for StubClinVarArchive {
        fn fetch_variant_summary(&self, _year: i32, _month: u32) -> Result<Vec<u8>, CoreError> {
            Ok(self.0.clone())
        }
    }

    /// gnomAD stub returning records whose CAID is among the queried ones.
    #[derive(Default)]
    pub struct StubGnomad(pub Vec<GnomadRecord>);

    impl GnomadSourceClient for StubGnomad {
        fn variants_for_caids(&self, caids: &[String]) -> Result<Vec<GnomadRecord>, CoreError> {
            Ok(self
                .0
                .iter()
                .filter(|r| caids.contains(&r.caid))
                .cloned()
                .collect())
        }
    }

    struct NoPublications;

    impl PublicationFetcher for NoPublications {
        fn fetch(&self, _identifier: &str) -> Result<Option<PublicationRecord>, CoreError> {
            Ok(None)
        }
    }

    pub fn empty_clients() -> ExternalClients {
        let none: Arc<dyn PublicationFetcher> = Arc::new(NoPublications);
        ExternalClients {
            vrs: Arc::new(StubVrs::new(vec![])),
            clingen: Arc::new(StubClinGen::default()),
            clinvar: Arc::new(StubClinVarArchive(Vec::new())),
            gnomad: Arc::new(StubGnomad::default()),
            publications: PublicationClients {
                pubmed: none.clone(),
                biorxiv: none.clone(),
                medrxiv: none.clone(),
                crossref: none,
            },
        }
    }

    pub fn test_context() -> AppContext {
        test_context_with(empty_clients())
    }

    pub fn test_context_with(clients: ExternalClients) -> AppContext {
        AppContext {
            db: Arc::new(tokio::sync::Mutex::new(Store::new())),
            queue: Arc::new(JobQueue::new()),
            clients,
        }
    }
}
