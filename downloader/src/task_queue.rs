/// Concurrent job queue for batch downloads.
///
/// Uses tokio Semaphore to limit how many orchestrator runs are in flight and
/// tracks the state of every job it has seen.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cobalt_shared::DownloadResult;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

/// Status of a tracked job in the queue.
#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub job_id: String,
    pub url: String,
    pub state: JobState,
    pub bytes_written: u64,
    pub enqueued_at: Instant,
    pub started_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Saved,
    Failed,
    Canceled,
}

impl From<&DownloadResult> for JobState {
    fn from(result: &DownloadResult) -> Self {
        match result {
            DownloadResult::Saved { .. } => JobState::Saved,
            DownloadResult::Canceled => JobState::Canceled,
            DownloadResult::Failed(_) => JobState::Failed,
        }
    }
}

pub struct JobQueue {
    /// Semaphore to limit concurrent runs.
    semaphore: Arc<Semaphore>,
    /// Active permits (held while a job runs).
    permits: Mutex<HashMap<String, OwnedSemaphorePermit>>,
    jobs: Mutex<HashMap<String, TrackedJob>>,
    max_concurrent: usize,
}

impl JobQueue {
    /// Create a new queue with the given concurrency limit (at least 1).
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            permits: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            max_concurrent,
        }
    }

    /// Track a new job. Returns false if the id is already tracked.
    pub async fn enqueue(&self, job_id: &str, url: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(job_id) {
            warn!("Job {} already in queue", job_id);
            return false;
        }

        jobs.insert(
            job_id.to_string(),
            TrackedJob {
                job_id: job_id.to_string(),
                url: url.to_string(),
                state: JobState::Queued,
                bytes_written: 0,
                enqueued_at: Instant::now(),
                started_at: None,
            },
        );
        info!("Job {} enqueued ({})", job_id, url);
        true
    }

    /// Wait for a free slot. Returns false if the job was canceled meanwhile
    /// or the queue is closed.
    pub async fn acquire(&self, job_id: &str) -> bool {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                warn!("Semaphore closed for job {}", job_id);
                return false;
            }
        };

        {
            let mut jobs = self.jobs.lock().await;
            match jobs.get_mut(job_id) {
                Some(job) if job.state == JobState::Queued => {
                    job.state = JobState::Running;
                    job.started_at = Some(Instant::now());
                }
                _ => return false,
            }
        }
        self.permits.lock().await.insert(job_id.to_string(), permit);

        info!("Job {} acquired slot, now running", job_id);
        true
    }

    /// Record the job's result and release its slot.
    pub async fn finish(&self, job_id: &str, result: &DownloadResult) {
        if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
            job.state = JobState::from(result);
            if let DownloadResult::Saved { bytes_written, .. } = result {
                job.bytes_written = *bytes_written;
            }
        }
        self.permits.lock().await.remove(job_id);
        info!("Job {} finished, slot released", job_id);
    }

    /// Mark a queued job canceled so it never starts. Running jobs are stopped
    /// through their cancellation token instead.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(job) if job.state == JobState::Queued => {
                job.state = JobState::Canceled;
                info!("Job {} canceled", job_id);
                true
            }
            _ => false,
        }
    }

    pub async fn get_status(&self, job_id: &str) -> Option<TrackedJob> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    pub async fn running_count(&self) -> usize {
        self.permits.lock().await.len()
    }

    pub async fn stats(&self) -> QueueStats {
        let jobs = self.jobs.lock().await;
        let count = |state: JobState| jobs.values().filter(|j| j.state == state).count();
        QueueStats {
            max_concurrent: self.max_concurrent,
            running: self.permits.lock().await.len(),
            queued: count(JobState::Queued),
            saved: count(JobState::Saved),
            failed: count(JobState::Failed),
            canceled: count(JobState::Canceled),
            bytes_written: jobs.values().map(|j| j.bytes_written).sum(),
        }
    }
}

/// Queue statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub max_concurrent: usize,
    pub running: usize,
    pub queued: usize,
    pub saved: usize,
    pub failed: usize,
    pub canceled: usize,
    pub bytes_written: u64,
}
