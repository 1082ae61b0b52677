//! In-process job queue.
//!
//! The production deployment fronts these queues with Redis; the worker core
//! only depends on the queue operations below, so the in-process
//! implementation doubles as the test double.

use std::collections::VecDeque;

use tokio::sync::Mutex;

/// FIFO queues consumed by the worker loop: job ids to execute and score set
/// ids awaiting variant mapping.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<i64>>,
    mapping: Mutex<VecDeque<i64>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job run for execution.
    pub async fn enqueue_job(&self, job_id: i64) {
        self.jobs.lock().await.push_back(job_id);
    }

    /// Pop the next job run to execute.
    pub async fn dequeue_job(&self) -> Option<i64> {
        self.jobs.lock().await.pop_front()
    }

    pub async fn pending_jobs(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Queue a score set for variant mapping.
    pub async fn push_mapping(&self, score_set_id: i64) {
        self.mapping.lock().await.push_back(score_set_id);
    }

    /// Pop the next score set awaiting mapping.
    pub async fn pop_mapping(&self) -> Option<i64> {
        self.mapping.lock().await.pop_front()
    }

    pub async fn pending_mappings(&self) -> usize {
        self.mapping.lock().await.len()
    }
}
