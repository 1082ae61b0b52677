//! Pipeline lifecycle coordination.
//!
//! Pipelines are pre-registered with an ordered list of steps. The managed
//! pipeline wrapper transitions CREATED → RUNNING before its first member
//! job executes, and coordinates the next step after every member job
//! terminates.

use std::sync::Arc;

use crate::error::CoreError;
use crate::jobs::manager::{
    run_managed, JobManager, JobOutcome, JobResultData, GUARANTEED_JOB_TYPE_PREFIX,
};
use crate::jobs::queue::JobQueue;
use crate::jobs::AppContext;
use crate::store::models::{JobStatus, PipelineStatus, PipelineStep};
use crate::store::Db;

/// Manager coordinating one pipeline's member jobs.
pub struct PipelineManager {
    pub db: Db,
    pub queue: Arc<JobQueue>,
    pipeline_id: i64,
}

impl PipelineManager {
    pub fn new(db: Db, queue: Arc<JobQueue>, pipeline_id: i64) -> Self {
        Self {
            db,
            queue,
            pipeline_id,
        }
    }

    /// Register a pipeline and enqueue its first step.
    pub async fn create_pipeline(
        ctx: &AppContext,
        pipeline_type: &str,
        steps: Vec<PipelineStep>,
        max_retries: i64,
    ) -> Result<i64, CoreError> {
        if steps.is_empty() {
            return Err(CoreError::Validation(crate::error::ValidationError::new(
                "a pipeline requires at least one step",
            )));
        }
        let (pipeline_id, first_job) = {
            let mut store = ctx.db.lock().await;
            let pipeline_id = store.create_pipeline(pipeline_type, steps.clone());
            let first = &steps[0];
            let job_id = store.create_job_run(
                pipeline_type,
                first.function,
                first.params.clone(),
                max_retries,
                Some(pipeline_id),
            );
            store.commit();
            (pipeline_id, job_id)
        };
        ctx.queue.enqueue_job(first_job).await;
        Ok(pipeline_id)
    }

    pub async fn get_pipeline_status(&self) -> Result<PipelineStatus, CoreError> {
        Ok(self.db.lock().await.pipeline(self.pipeline_id)?.status)
    }

    /// Transition the pipeline from CREATED to RUNNING. A pipeline may only
    /// start from CREATED.
    pub async fn start_pipeline(&self) -> Result<(), CoreError> {
        let mut store = self.db.lock().await;
        let pipeline = store.pipeline_mut(self.pipeline_id)?;
        if pipeline.status != PipelineStatus::Created {
            return Err(CoreError::Conflict(format!(
                "pipeline {} cannot start from status {}",
                self.pipeline_id, pipeline.status
            )));
        }
        pipeline.status = PipelineStatus::Running;
        store.commit();
        Ok(())
    }

    /// Advance or terminate the pipeline based on the latest member job:
    /// SUCCEEDED enqueues the next step (or finishes the pipeline after the
    /// last step), terminal FAILED fails the pipeline, RETRIED leaves it
    /// RUNNING.
    pub async fn coordinate_pipeline(&self) -> Result<(), CoreError> {
        let next_job = {
            let mut store = self.db.lock().await;
            let pipeline = store.pipeline(self.pipeline_id)?;
            if pipeline.status != PipelineStatus::Running {
                return Ok(());
            }

            let latest_status = store
                .job_runs_for_pipeline(self.pipeline_id)
                .last()
                .map(|job| job.status);
            let Some(latest_status) = latest_status else {
                return Ok(());
            };

            match latest_status {
                JobStatus::Succeeded => {
                    let pipeline = store.pipeline_mut(self.pipeline_id)?;
                    if pipeline.current_step + 1 >= pipeline.steps.len() {
                        pipeline.status = PipelineStatus::Succeeded;
                        store.commit();
                        None
                    } else {
                        pipeline.current_step += 1;
                        let step = pipeline.steps[pipeline.current_step].clone();
                        let pipeline_type = pipeline.pipeline_type.clone();
                        let max_retries = store
                            .job_runs_for_pipeline(self.pipeline_id)
                            .last()
                            .map(|j| j.max_retries)
                            .unwrap_or_default();
                        let job_id = store.create_job_run(
                            &pipeline_type,
                            step.function,
                            step.params,
                            max_retries,
                            Some(self.pipeline_id),
                        );
                        store.commit();
                        Some(job_id)
                    }
                }
                JobStatus::Failed => {
                    let pipeline = store.pipeline_mut(self.pipeline_id)?;
                    pipeline.status = PipelineStatus::Failed;
                    store.commit();
                    None
                }
                // A retried job keeps the pipeline running; no new jobs are
                // enqueued here because the retry re-enqueued the same job.
                JobStatus::Retried | JobStatus::Running | JobStatus::Pending => None,
            }
        };

        if let Some(job_id) = next_job {
            self.queue.enqueue_job(job_id).await;
        }
        Ok(())
    }
}

/// Execute a job body with pipeline management stacked on job management.
///
/// Jobs without a pipeline run under plain job management. Jobs created via
/// the guaranteed-record entrypoint are rejected here.
pub async fn run_with_pipeline<F, Fut>(ctx: &AppContext, job_id: i64, body: F) -> JobResultData
where
    F: FnOnce(JobManager) -> Fut,
    Fut: std::future::Future<Output = Result<JobResultData, CoreError>>,
{
    let (pipeline_id, job_type) = {
        let store = ctx.db.lock().await;
        match store.job_run(job_id) {
            Ok(job) => (job.pipeline_id, job.job_type.clone()),
            Err(e) => {
                tracing::error!(job_id, "refusing to execute job without a job run record");
                return JobResultData {
                    status: JobOutcome::Failed,
                    data: serde_json::json!({}),
                    exception: Some(crate::jobs::manager::ExceptionDetails {
                        r#type: e.class_name().to_owned(),
                        message: e.to_string(),
                        traceback: None,
                    }),
                };
            }
        }
    };

    if job_type.starts_with(GUARANTEED_JOB_TYPE_PREFIX) {
        let error = CoreError::Conflict(
            "guaranteed job run records may not be combined with pipeline management".to_owned(),
        );
        tracing::error!(job_id, "{}", error);
        return JobResultData {
            status: JobOutcome::Failed,
            data: serde_json::json!({}),
            exception: Some(crate::jobs::manager::ExceptionDetails {
                r#type: error.class_name().to_owned(),
                message: error.to_string(),
                traceback: None,
            }),
        };
    }

    let manager = pipeline_id.map(|id| PipelineManager::new(ctx.db.clone(), ctx.queue.clone(), id));

    // Start a freshly created pipeline before its first member job runs.
    if let Some(manager) = &manager {
        match manager.get_pipeline_status().await {
            Ok(PipelineStatus::Created) => {
                if let Err(e) = manager.start_pipeline().await {
                    tracing::error!(job_id, error = %e, "unable to start pipeline");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(job_id, error = %e, "unable to load pipeline"),
        }
    }

    let result = run_managed(ctx, job_id, body).await;

    if let Some(manager) = &manager {
        if let Err(e) = manager.coordinate_pipeline().await {
            tracing::error!(job_id, error = %e, "pipeline coordination failed");
        }
    } else {
        tracing::debug!(job_id, "no pipeline associated with job; skipping coordination");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_support::test_context;
    use crate::store::models::JobFunction;
    use pretty_assertions::assert_eq;

    fn steps() -> Vec<PipelineStep> {
        vec![
            PipelineStep {
                function: JobFunction::VariantMapperManager,
                params: serde_json::json!({"step": 0}),
            },
            PipelineStep {
                function: JobFunction::VariantMapperManager,
                params: serde_json::json!({"step": 1}),
            },
        ]
    }

    #[tokio::test]
    async fn pipeline_runs_steps_in_order_and_succeeds() {
        let ctx = test_context();
        let pipeline_id = PipelineManager::create_pipeline(&ctx, "test", steps(), 0)
            .await
            .unwrap();

        // First member job: pipeline starts, job succeeds, next step queued.
        let first = ctx.queue.dequeue_job().await.unwrap();
        run_with_pipeline(&ctx, first, |_m| async { Ok(JobResultData::ok()) }).await;
        {
            let store = ctx.db.lock().await;
            assert_eq!(
                PipelineStatus::Running,
                store.pipeline(pipeline_id).unwrap().status
            );
            assert_eq!(1, store.pipeline(pipeline_id).unwrap().current_step);
        }

        let second = ctx.queue.dequeue_job().await.unwrap();
        assert_ne!(first, second);
        run_with_pipeline(&ctx, second, |_m| async { Ok(JobResultData::ok()) }).await;
        let store = ctx.db.lock().await;
        assert_eq!(
            PipelineStatus::Succeeded,
            store.pipeline(pipeline_id).unwrap().status
        );
    }

    #[tokio::test]
    async fn terminal_failure_fails_the_pipeline() {
        let ctx = test_context();
        let pipeline_id = PipelineManager::create_pipeline(&ctx, "test", steps(), 0)
            .await
            .unwrap();
        let first = ctx.queue.dequeue_job().await.unwrap();
        run_with_pipeline(&ctx, first, |_m| async {
            Err(CoreError::Transport("boom".to_owned()))
        })
        .await;

        let store = ctx.db.lock().await;
        assert_eq!(
            PipelineStatus::Failed,
            store.pipeline(pipeline_id).unwrap().status
        );
        // No further jobs were enqueued.
        drop(store);
        assert_eq!(None, ctx.queue.dequeue_job().await);
    }

    #[tokio::test]
    async fn retried_jobs_keep_the_pipeline_running() {
        let ctx = test_context();
        let pipeline_id = PipelineManager::create_pipeline(&ctx, "test", steps(), 1)
            .await
            .unwrap();
        let first = ctx.queue.dequeue_job().await.unwrap();
        run_with_pipeline(&ctx, first, |_m| async {
            Err(CoreError::Transport("boom".to_owned()))
        })
        .await;
        {
            let store = ctx.db.lock().await;
            assert_eq!(
                PipelineStatus::Running,
                store.pipeline(pipeline_id).unwrap().status
            );
        }

        // The retry re-enqueued the same job; a success now advances the
        // pipeline.
        let retried = ctx.queue.dequeue_job().await.unwrap();
        assert_eq!(first, retried);
        run_with_pipeline(&ctx, retried, |_m| async { Ok(JobResultData::ok()) }).await;
        let second = ctx.queue.dequeue_job().await.unwrap();
        run_with_pipeline(&ctx, second, |_m| async { Ok(JobResultData::ok()) }).await;
        let store = ctx.db.lock().await;
        assert_eq!(
            PipelineStatus::Succeeded,
            store.pipeline(pipeline_id).unwrap().status
        );
    }

    #[tokio::test]
    async fn guaranteed_records_are_rejected_by_pipeline_management() {
        let ctx = test_context();
        let job_id = {
            let mut store = ctx.db.lock().await;
            let id = store.create_job_run(
                &format!("{}:cron", GUARANTEED_JOB_TYPE_PREFIX),
                JobFunction::RefreshClinvarControls,
                serde_json::json!({}),
                0,
                None,
            );
            store.commit();
            id
        };
        let result =
            run_with_pipeline(&ctx, job_id, |_m| async { Ok(JobResultData::ok()) }).await;
        assert_eq!(JobOutcome::Failed, result.status);
        // The body never executed.
        let store = ctx.db.lock().await;
        assert_eq!(JobStatus::Pending, store.job_run(job_id).unwrap().status);
    }

    #[tokio::test]
    async fn pipelines_only_start_from_created() {
        let ctx = test_context();
        let pipeline_id = PipelineManager::create_pipeline(&ctx, "test", steps(), 0)
            .await
            .unwrap();
        let manager = PipelineManager::new(ctx.db.clone(), ctx.queue.clone(), pipeline_id);
        manager.start_pipeline().await.unwrap();
        assert!(manager.start_pipeline().await.is_err());
    }
}
