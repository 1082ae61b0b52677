//! Managed job lifecycle.
//!
//! Every job execution runs inside [`run_managed`], which owns the JobRun
//! state machine: PENDING/RETRIED → RUNNING → SUCCEEDED | FAILED | RETRIED.
//! Terminal errors are converted into a structured result and never
//! re-raised; the worker loop always sees a [`JobResultData`].

use std::sync::Arc;

use crate::error::CoreError;
use crate::jobs::queue::JobQueue;
use crate::jobs::AppContext;
use crate::store::models::{JobRun, JobStatus};
use crate::store::Db;

/// Job type recorded by [`run_guaranteed`]; jobs of this type may not take
/// part in pipeline management.
pub const GUARANTEED_JOB_TYPE_PREFIX: &str = "guaranteed";

/// Outcome of one managed job execution.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobOutcome {
    Ok,
    Failed,
    Retried,
}

/// The structured result payload the worker sees for every job execution.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JobResultData {
    pub status: JobOutcome,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionDetails>,
}

/// Recorded details of the error that terminated a job.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExceptionDetails {
    pub r#type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl JobResultData {
    pub fn ok() -> Self {
        Self {
            status: JobOutcome::Ok,
            data: serde_json::json!({}),
            exception: None,
        }
    }

    pub fn ok_with(data: serde_json::Value) -> Self {
        Self {
            status: JobOutcome::Ok,
            data,
            exception: None,
        }
    }

    fn from_error(status: JobOutcome, error: &CoreError) -> Self {
        Self {
            status,
            data: serde_json::json!({}),
            exception: Some(ExceptionDetails {
                r#type: error.class_name().to_owned(),
                message: error.to_string(),
                traceback: None,
            }),
        }
    }
}

/// Handle injected into every managed job: progress, context, and store
/// access.
#[derive(Clone)]
pub struct JobManager {
    pub db: Db,
    pub queue: Arc<JobQueue>,
    job_id: i64,
}

impl JobManager {
    pub fn new(db: Db, queue: Arc<JobQueue>, job_id: i64) -> Self {
        Self { db, queue, job_id }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    /// A snapshot of the job record.
    pub async fn get_job(&self) -> Result<JobRun, CoreError> {
        Ok(self.db.lock().await.job_run(self.job_id)?.clone())
    }

    /// Record job progress; persisted immediately.
    pub async fn update_progress(
        &self,
        completed: i64,
        total: i64,
        message: &str,
    ) -> Result<(), CoreError> {
        let mut store = self.db.lock().await;
        let job = store.job_run_mut(self.job_id)?;
        job.progress.completed = completed;
        job.progress.total = total;
        job.progress.message = Some(message.to_owned());
        tracing::debug!(job_id = self.job_id, completed, total, message, "job progress");
        Ok(())
    }

    /// Merge key/value pairs into the job's logging context.
    pub async fn save_to_context(&self, entries: serde_json::Value) -> Result<(), CoreError> {
        let mut store = self.db.lock().await;
        let job = store.job_run_mut(self.job_id)?;
        if let (Some(context), Some(entries)) = (job.context.as_object_mut(), entries.as_object())
        {
            for (key, value) in entries {
                context.insert(key.clone(), value.clone());
            }
        } else if job.context.is_null() {
            job.context = entries;
        }
        Ok(())
    }
}

/// Execute a job body under full lifecycle management.
///
/// The body receives a [`JobManager`]; its `Ok` marks the job SUCCEEDED. On
/// `Err`, the store is rolled back to the job's last commit, the failure is
/// recorded, and the job either becomes terminal FAILED or, for retriable
/// error classes with retries remaining, RETRIED and re-enqueued with
/// identical parameters. The error is never re-raised.
pub async fn run_managed<F, Fut>(ctx: &AppContext, job_id: i64, body: F) -> JobResultData
where
    F: FnOnce(JobManager) -> Fut,
    Fut: std::future::Future<Output = Result<JobResultData, CoreError>>,
{
    // Load the job and mark it running; refuse to run without a record.
    {
        let mut store = ctx.db.lock().await;
        match store.job_run_mut(job_id) {
            Ok(job) => {
                job.status = JobStatus::Running;
                job.started_at = Some(chrono::Utc::now());
            }
            Err(e) => {
                tracing::error!(job_id, "refusing to execute job without a job run record");
                return JobResultData::from_error(JobOutcome::Failed, &e);
            }
        }
        store.commit();
    }

    let manager = JobManager::new(ctx.db.clone(), ctx.queue.clone(), job_id);
    let result = body(manager).await;

    match result {
        Ok(result) => {
            let mut store = ctx.db.lock().await;
            if let Ok(job) = store.job_run_mut(job_id) {
                job.status = JobStatus::Succeeded;
                job.finished_at = Some(chrono::Utc::now());
                job.result = serde_json::to_value(&result).ok();
            }
            store.commit();
            result
        }
        Err(error) => {
            // Prioritize salvaging lifecycle state: roll back uncommitted
            // changes, then persist the terminal status.
            let mut store = ctx.db.lock().await;
            store.rollback();

            let mut outcome = JobResultData::from_error(JobOutcome::Failed, &error);
            let should_retry = match store.job_run_mut(job_id) {
                Ok(job) => {
                    job.status = JobStatus::Failed;
                    job.finished_at = Some(chrono::Utc::now());
                    let retry = error.is_retriable() && job.retry_count < job.max_retries;
                    if retry {
                        job.status = JobStatus::Retried;
                        job.retry_count += 1;
                        outcome.status = JobOutcome::Retried;
                    }
                    job.result = serde_json::to_value(&outcome).ok();
                    retry
                }
                Err(_) => false,
            };
            store.commit();
            drop(store);

            tracing::error!(job_id, error = %error, retried = should_retry, "job failed");
            if should_retry {
                // Re-enqueue with identical parameters.
                ctx.queue.enqueue_job(job_id).await;
            }
            outcome
        }
    }
}

/// Create and persist a JobRun before executing a job body: the only safe
/// entrypoint for cron-like jobs. The created record is standalone;
/// combining it with pipeline management is rejected by the pipeline layer.
pub async fn run_guaranteed<F, Fut>(
    ctx: &AppContext,
    job_type: &str,
    job_function: crate::store::models::JobFunction,
    job_params: serde_json::Value,
    max_retries: i64,
    body: F,
) -> (i64, JobResultData)
where
    F: FnOnce(JobManager) -> Fut,
    Fut: std::future::Future<Output = Result<JobResultData, CoreError>>,
{
    let job_id = {
        let mut store = ctx.db.lock().await;
        let id = store.create_job_run(
            &format!("{}:{}", GUARANTEED_JOB_TYPE_PREFIX, job_type),
            job_function,
            job_params,
            max_retries,
            None,
        );
        store.commit();
        id
    };
    let result = run_managed(ctx, job_id, body).await;
    (job_id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::jobs::test_support::test_context;
    use crate::store::models::JobFunction;
    use pretty_assertions::assert_eq;

    async fn make_job(ctx: &AppContext, max_retries: i64) -> i64 {
        let mut store = ctx.db.lock().await;
        let id = store.create_job_run(
            "test",
            JobFunction::VariantMapperManager,
            serde_json::json!({}),
            max_retries,
            None,
        );
        store.commit();
        id
    }

    #[tokio::test]
    async fn successful_jobs_are_marked_succeeded() {
        let ctx = test_context();
        let job_id = make_job(&ctx, 0).await;
        let result = run_managed(&ctx, job_id, |_m| async { Ok(JobResultData::ok()) }).await;
        assert_eq!(JobOutcome::Ok, result.status);
        let store = ctx.db.lock().await;
        let job = store.job_run(job_id).unwrap();
        assert_eq!(JobStatus::Succeeded, job.status);
        assert!(job.started_at.is_some() && job.finished_at.is_some());
    }

    #[tokio::test]
    async fn missing_job_record_is_refused() {
        let ctx = test_context();
        let result = run_managed(&ctx, 999, |_m| async { Ok(JobResultData::ok()) }).await;
        assert_eq!(JobOutcome::Failed, result.status);
    }

    #[tokio::test]
    async fn validation_errors_are_terminal() {
        let ctx = test_context();
        let job_id = make_job(&ctx, 3).await;
        let result = run_managed(&ctx, job_id, |_m| async {
            Err(CoreError::Validation(ValidationError::new("bad data")))
        })
        .await;
        assert_eq!(JobOutcome::Failed, result.status);
        let store = ctx.db.lock().await;
        let job = store.job_run(job_id).unwrap();
        assert_eq!(JobStatus::Failed, job.status);
        assert_eq!(0, job.retry_count);
        assert_eq!(0, ctx.queue.pending_jobs().await);
        assert_eq!(
            "ValidationError",
            result.exception.unwrap().r#type
        );
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn transient_errors_are_retried_until_exhausted() {
        let ctx = test_context();
        let job_id = make_job(&ctx, 1).await;

        let result = run_managed(&ctx, job_id, |_m| async {
            Err(CoreError::Transport("upstream 503".to_owned()))
        })
        .await;
        assert_eq!(JobOutcome::Retried, result.status);
        {
            let store = ctx.db.lock().await;
            let job = store.job_run(job_id).unwrap();
            assert_eq!(JobStatus::Retried, job.status);
            assert_eq!(1, job.retry_count);
        }
        // The job was re-enqueued with identical parameters.
        assert_eq!(Some(job_id), ctx.queue.dequeue_job().await);

        // A second failure exhausts max_retries and is terminal.
        let result = run_managed(&ctx, job_id, |_m| async {
            Err(CoreError::Transport("upstream 503".to_owned()))
        })
        .await;
        assert_eq!(JobOutcome::Failed, result.status);
        let store = ctx.db.lock().await;
        let job = store.job_run(job_id).unwrap();
        assert_eq!(JobStatus::Failed, job.status);
        assert_eq!(1, job.retry_count);
        assert!(job.retry_count <= job.max_retries);
        assert!(logs_contain("job failed"));
    }

    #[tokio::test]
    async fn failures_roll_back_uncommitted_store_changes() {
        let ctx = test_context();
        let job_id = make_job(&ctx, 0).await;
        let db = ctx.db.clone();
        run_managed(&ctx, job_id, |_m| async move {
            let mut store = db.lock().await;
            store.create_user("uncommitted", vec![]);
            Err(CoreError::Transport("boom".to_owned()))
        })
        .await;
        let store = ctx.db.lock().await;
        assert!(store.users.values().all(|u| u.username != "uncommitted"));
    }

    #[tokio::test]
    async fn progress_and_context_are_persisted() {
        let ctx = test_context();
        let job_id = make_job(&ctx, 0).await;
        run_managed(&ctx, job_id, |manager| async move {
            manager.update_progress(50, 100, "halfway").await?;
            manager
                .save_to_context(serde_json::json!({"resource": "tmp:x"}))
                .await?;
            Ok(JobResultData::ok())
        })
        .await;
        let store = ctx.db.lock().await;
        let job = store.job_run(job_id).unwrap();
        assert_eq!(50, job.progress.completed);
        assert_eq!(Some("halfway".to_owned()), job.progress.message);
        assert_eq!("tmp:x", job.context["resource"]);
    }

    #[tokio::test]
    async fn guaranteed_jobs_create_their_own_record() {
        let ctx = test_context();
        let (job_id, result) = run_guaranteed(
            &ctx,
            "cron",
            JobFunction::RefreshClinvarControls,
            serde_json::json!({"year": 2026, "month": 1}),
            0,
            |_m| async { Ok(JobResultData::ok()) },
        )
        .await;
        assert_eq!(JobOutcome::Ok, result.status);
        let store = ctx.db.lock().await;
        let job = store.job_run(job_id).unwrap();
        assert!(job.job_type.starts_with(GUARANTEED_JOB_TYPE_PREFIX));
        assert_eq!(JobStatus::Succeeded, job.status);
    }
}
