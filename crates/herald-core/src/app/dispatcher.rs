//! Dispatcher - key ごとに高々 1 つの active job
//!
//! # 設計原則
//! - check-and-insert は 1 つの短い critical section（await を跨がない）
//! - key の解放は RAII guard の Drop。panic しても必ず解放される
//! - 受理した job は独立した tokio task で走り、呼び出し側を待たせない
//! - `max_concurrent_jobs` は semaphore。permit 待ちの間 job は PENDING のまま

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pipeline::Pipeline;
use super::status::{JobCounts, StageCounts};
use crate::domain::{
    ArtifactOrigin, Assignment, DispatchError, FulfillmentJob, JobId, JobKey, JobStage,
};
use crate::ports::IdGenerator;

struct ActiveEntry {
    job_id: JobId,
    stage: watch::Receiver<JobStage>,
}

#[derive(Default)]
struct Totals {
    accepted: AtomicU64,
    rejected_duplicate: AtomicU64,
    completed: AtomicU64,
    fallback_used: AtomicU64,
    publication_failed: AtomicU64,
    delivered: AtomicU64,
    delivery_exhausted: AtomicU64,
}

impl Totals {
    fn record(&self, job: &FulfillmentJob) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if job.artifact_origin == Some(ArtifactOrigin::Fallback) {
            self.fallback_used.fetch_add(1, Ordering::Relaxed);
        }
        if job.publication_failure.is_some() {
            self.publication_failed.fetch_add(1, Ordering::Relaxed);
        }
        match &job.delivery {
            Some(d) if d.is_delivered() => self.delivered.fetch_add(1, Ordering::Relaxed),
            _ => self.delivery_exhausted.fetch_add(1, Ordering::Relaxed),
        };
    }
}

struct Inner {
    pipeline: Arc<Pipeline>,
    ids: Arc<dyn IdGenerator>,
    active: Mutex<HashMap<JobKey, ActiveEntry>>,
    permits: Option<Arc<Semaphore>>,
    shutting_down: AtomicBool,
    idle: Notify,
    totals: Totals,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, HashMap<JobKey, ActiveEntry>> {
        // The map stays consistent even if a holder panicked: every critical
        // section is a single insert, remove, or read.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases a key when the job task ends, however it ends.
struct KeyGuard {
    inner: Arc<Inner>,
    key: JobKey,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let now_idle = {
            let mut active = self.inner.active();
            active.remove(&self.key);
            active.is_empty()
        };
        debug!(job_key = %self.key, "key released");
        if now_idle {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Accepts assignments and runs each as an independent job.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// `max_concurrent_jobs == 0` means unbounded.
    pub fn new(pipeline: Arc<Pipeline>, ids: Arc<dyn IdGenerator>, max_concurrent_jobs: usize) -> Self {
        let permits = (max_concurrent_jobs > 0).then(|| Arc::new(Semaphore::new(max_concurrent_jobs)));
        Self {
            inner: Arc::new(Inner {
                pipeline,
                ids,
                active: Mutex::new(HashMap::new()),
                permits,
                shutting_down: AtomicBool::new(false),
                idle: Notify::new(),
                totals: Totals::default(),
            }),
        }
    }

    pub fn generator_name(&self) -> &str {
        self.inner.pipeline.generator_name()
    }

    pub fn publisher_name(&self) -> &str {
        self.inner.pipeline.publisher_name()
    }

    /// Accept or reject. Never waits for the pipeline.
    pub fn submit(&self, assignment: Assignment) -> Result<JobHandle, DispatchError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(DispatchError::Shutdown);
        }

        let key = assignment.key.clone();
        let (stage_tx, stage_rx) = watch::channel(JobStage::Pending);
        let job_id = {
            let mut active = self.inner.active();
            if let Some(existing) = active.get(&key) {
                self.inner
                    .totals
                    .rejected_duplicate
                    .fetch_add(1, Ordering::Relaxed);
                warn!(job_key = %key, active_job = %existing.job_id, "duplicate submission rejected");
                return Err(DispatchError::DuplicateJob(key));
            }
            let job_id = self.inner.ids.generate_job_id();
            active.insert(
                key.clone(),
                ActiveEntry {
                    job_id,
                    stage: stage_rx.clone(),
                },
            );
            job_id
        };
        self.inner.totals.accepted.fetch_add(1, Ordering::Relaxed);
        info!(%job_id, job_key = %key, "job accepted");

        let guard = KeyGuard {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
        };
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            let _permit = match &inner.permits {
                Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
                None => None,
            };
            let job = inner.pipeline.run(job_id, assignment, &stage_tx).await;
            inner.totals.record(&job);
            drop(guard);
            job
        });

        Ok(JobHandle {
            job_id,
            key,
            stage: stage_rx,
            join,
        })
    }

    pub fn is_active(&self, key: &JobKey) -> bool {
        self.inner.active().contains_key(key)
    }

    pub fn active_jobs(&self) -> usize {
        self.inner.active().len()
    }

    pub fn counts(&self) -> JobCounts {
        let mut active = StageCounts::default();
        for entry in self.inner.active().values() {
            active.add(*entry.stage.borrow());
        }
        let t = &self.inner.totals;
        JobCounts {
            active,
            accepted: t.accepted.load(Ordering::Relaxed),
            rejected_duplicate: t.rejected_duplicate.load(Ordering::Relaxed),
            completed: t.completed.load(Ordering::Relaxed),
            fallback_used: t.fallback_used.load(Ordering::Relaxed),
            publication_failed: t.publication_failed.load(Ordering::Relaxed),
            delivered: t.delivered.load(Ordering::Relaxed),
            delivery_exhausted: t.delivery_exhausted.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting new jobs. Running jobs continue to DONE.
    pub fn shutdown(&self) {
        if !self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            info!(active = self.active_jobs(), "dispatcher stopped accepting jobs");
        }
    }

    /// Resolve once no job is active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.active().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Handle to an accepted job.
pub struct JobHandle {
    pub job_id: JobId,
    pub key: JobKey,
    stage: watch::Receiver<JobStage>,
    join: JoinHandle<FulfillmentJob>,
}

impl JobHandle {
    pub fn stage(&self) -> JobStage {
        *self.stage.borrow()
    }

    /// Wait for the job to reach DONE and return its final record.
    pub async fn wait(self) -> Result<FulfillmentJob, DispatchError> {
        self.join
            .await
            .map_err(|e| DispatchError::Lost(format!("{}: {e}", self.job_id)))
    }
}
