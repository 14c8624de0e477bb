//! Delivery job queue: worker pool, polling, retry, dead-lettering.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the pool to stop; it does not
//! wait for in-flight jobs. For graceful shutdown, coordinate with your
//! runtime and allow time for running jobs to finish before process exit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use meetrelay_core::models::DeliveryJob;
use meetrelay_core::stores::JobStore;
use meetrelay_services::ChatClient;

use crate::backoff::next_run_at;
use crate::pipeline::JobProcessor;

#[derive(Clone)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub backoff_base_seconds: u64,
    pub backoff_cap_seconds: u64,
    /// Chat that receives dead-letter reports. None disables them.
    pub operator_chat_id: Option<i64>,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            backoff_base_seconds: 5,
            backoff_cap_seconds: 300,
            operator_chat_id: None,
        }
    }
}

pub struct JobQueue {
    shutdown_tx: mpsc::Sender<()>,
}

impl JobQueue {
    /// Start the worker pool. It polls the job store at `poll_interval_ms`
    /// and dispatches up to `max_workers` jobs concurrently.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        processor: Arc<dyn JobProcessor>,
        chat: Arc<dyn ChatClient>,
        config: JobQueueConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::worker_pool(jobs, processor, chat, config, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    /// Signal the pool to stop claiming new jobs.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn worker_pool(
        jobs: Arc<dyn JobStore>,
        processor: Arc<dyn JobProcessor>,
        chat: Arc<dyn ChatClient>,
        config: JobQueueConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "delivery queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("delivery queue worker pool shutting down");
                    break;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(
                        &jobs,
                        &processor,
                        &chat,
                        &semaphore,
                        &config,
                    ).await;
                }
            }
        }

        tracing::info!("delivery queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        jobs: &Arc<dyn JobStore>,
        processor: &Arc<dyn JobProcessor>,
        chat: &Arc<dyn ChatClient>,
        semaphore: &Arc<Semaphore>,
        config: &JobQueueConfig,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("no workers available, skipping claim");
                return;
            }
        };

        match jobs.claim_due(Utc::now(), 1).await {
            Ok(mut claimed) => match claimed.pop() {
                Some(job) => {
                    let jobs = jobs.clone();
                    let processor = processor.clone();
                    let chat = chat.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::process_job(job, &*jobs, &*processor, &*chat, &config).await;
                    });
                }
                None => {
                    drop(permit);
                    tracing::trace!("no delivery jobs due");
                }
            },
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "failed to claim delivery jobs");
            }
        }
    }

    /// Run one claimed job to its next state: done, rescheduled, or
    /// dead-lettered. The job's attempt counter was already incremented by
    /// the claim.
    pub async fn process_job(
        job: DeliveryJob,
        jobs: &dyn JobStore,
        processor: &dyn JobProcessor,
        chat: &dyn ChatClient,
        config: &JobQueueConfig,
    ) {
        match processor.process(&job).await {
            Ok(()) => {
                if let Err(e) = jobs.complete(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "failed to mark job done");
                    return;
                }
                tracing::info!(job_id = %job.id, attempts = job.attempts, "delivery job done");
            }
            Err(err) => {
                let retry = err.is_retryable() && job.attempts < job.max_attempts;
                if retry {
                    let run_at = next_run_at(
                        Utc::now(),
                        job.attempts,
                        config.backoff_base_seconds,
                        config.backoff_cap_seconds,
                        err.retry_after(),
                    );
                    tracing::warn!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        error = %err,
                        run_at = %run_at,
                        "delivery job failed, rescheduling"
                    );
                    if let Err(e) = jobs.reschedule(job.id, run_at, &err.to_string()).await {
                        tracing::error!(job_id = %job.id, error = %e, "failed to reschedule job");
                    }
                } else {
                    tracing::error!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        error = %err,
                        "delivery job dead-lettered"
                    );
                    if let Err(e) = jobs.dead_letter(job.id, &err.to_string()).await {
                        tracing::error!(job_id = %job.id, error = %e, "failed to dead-letter job");
                        return;
                    }

                    if let Some(message) = err.user_message() {
                        if let Err(e) = chat.send_message(job.chat_id, &message).await {
                            tracing::warn!(job_id = %job.id, error = %e, "failed to notify chat");
                        }
                    }
                    if let Some(operator) = config.operator_chat_id {
                        let report = format!(
                            "Delivery job {} for meeting {} dead-lettered after {} attempt(s): {}",
                            job.id, job.meeting_id, job.attempts, err
                        );
                        if let Err(e) = chat.send_message(operator, &report).await {
                            tracing::warn!(job_id = %job.id, error = %e, "failed to notify operator");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use meetrelay_core::models::JobState;
    use meetrelay_core::{AppError, JobError};
    use meetrelay_services::DeliveryMethod;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct InMemoryJobStore {
        jobs: Mutex<HashMap<Uuid, DeliveryJob>>,
    }

    impl InMemoryJobStore {
        fn insert(&self, job: DeliveryJob) {
            self.jobs.lock().unwrap().insert(job.id, job);
        }

        fn get_sync(&self, id: Uuid) -> DeliveryJob {
            self.jobs.lock().unwrap().get(&id).unwrap().clone()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn enqueue(&self, job: &DeliveryJob) -> Result<DeliveryJob, AppError> {
            self.insert(job.clone());
            Ok(job.clone())
        }

        async fn get(&self, id: Uuid) -> Result<Option<DeliveryJob>, AppError> {
            Ok(self.jobs.lock().unwrap().get(&id).cloned())
        }

        async fn claim_due(
            &self,
            now: DateTime<Utc>,
            limit: i64,
        ) -> Result<Vec<DeliveryJob>, AppError> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut claimed = Vec::new();
            for job in jobs.values_mut() {
                if claimed.len() as i64 >= limit {
                    break;
                }
                if matches!(job.state, JobState::Queued | JobState::Failed) && job.run_at <= now {
                    job.state = JobState::Fetching;
                    job.attempts += 1;
                    claimed.push(job.clone());
                }
            }
            Ok(claimed)
        }

        async fn set_state(&self, id: Uuid, state: JobState) -> Result<(), AppError> {
            self.jobs.lock().unwrap().get_mut(&id).unwrap().state = state;
            Ok(())
        }

        async fn complete(&self, id: Uuid) -> Result<(), AppError> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(&id).unwrap();
            job.state = JobState::Done;
            job.last_error = None;
            Ok(())
        }

        async fn reschedule(
            &self,
            id: Uuid,
            run_at: DateTime<Utc>,
            last_error: &str,
        ) -> Result<(), AppError> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(&id).unwrap();
            job.state = JobState::Failed;
            job.run_at = run_at;
            job.last_error = Some(last_error.to_string());
            Ok(())
        }

        async fn dead_letter(&self, id: Uuid, last_error: &str) -> Result<(), AppError> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(&id).unwrap();
            job.state = JobState::DeadLettered;
            job.last_error = Some(last_error.to_string());
            Ok(())
        }

        async fn count_by_state(&self, state: JobState) -> Result<i64, AppError> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.values().filter(|j| j.state == state).count() as i64)
        }
    }

    struct ScriptedProcessor {
        calls: AtomicUsize,
        /// Fail this many times before succeeding; usize::MAX fails forever.
        failures: usize,
        error: fn() -> JobError,
    }

    #[async_trait]
    impl JobProcessor for ScriptedProcessor {
        async fn process(&self, _job: &DeliveryJob) -> Result<(), JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err((self.error)())
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        messages: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), JobError> {
            self.messages
                .lock()
                .unwrap()
                .push((chat_id, text.to_string()));
            Ok(())
        }

        async fn send_file(
            &self,
            _chat_id: i64,
            _method: DeliveryMethod,
            _path: &Path,
            _file_name: &str,
            _caption: &str,
        ) -> Result<(), JobError> {
            Ok(())
        }
    }

    fn job() -> DeliveryJob {
        DeliveryJob {
            id: Uuid::new_v4(),
            meeting_id: Uuid::new_v4(),
            connection_id: Uuid::new_v4(),
            chat_id: 42,
            state: JobState::Queued,
            attempts: 0,
            max_attempts: 5,
            last_error: None,
            run_at: Utc::now() - chrono::Duration::seconds(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn config(operator: Option<i64>) -> JobQueueConfig {
        JobQueueConfig {
            operator_chat_id: operator,
            ..JobQueueConfig::default()
        }
    }

    /// Drive claim/process cycles until nothing is due, ignoring backoff by
    /// claiming far in the future.
    async fn drain(
        store: &InMemoryJobStore,
        processor: &dyn JobProcessor,
        chat: &dyn ChatClient,
        config: &JobQueueConfig,
    ) {
        let far_future = Utc::now() + chrono::Duration::days(30);
        loop {
            let claimed = store.claim_due(far_future, 10).await.unwrap();
            if claimed.is_empty() {
                break;
            }
            for job in claimed {
                JobQueue::process_job(job, store, processor, chat, config).await;
            }
        }
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let store = InMemoryJobStore::default();
        let job = job();
        let id = job.id;
        store.insert(job);

        let processor = ScriptedProcessor {
            calls: AtomicUsize::new(0),
            failures: 1,
            error: || JobError::transient("connection reset"),
        };
        let chat = RecordingChat::default();

        drain(&store, &processor, &chat, &config(None)).await;

        let finished = store.get_sync(id);
        assert_eq!(finished.state, JobState::Done);
        assert_eq!(finished.attempts, 2);
        assert!(finished.last_error.is_none());
    }

    #[tokio::test]
    async fn test_persistent_failure_dead_letters_after_max_attempts() {
        let store = InMemoryJobStore::default();
        let job = job();
        let id = job.id;
        store.insert(job);

        let processor = ScriptedProcessor {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
            error: || JobError::transient("still down"),
        };
        let chat = RecordingChat::default();

        drain(&store, &processor, &chat, &config(Some(777))).await;

        let finished = store.get_sync(id);
        assert_eq!(finished.state, JobState::DeadLettered);
        assert_eq!(finished.attempts, 5);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 5);

        // Operator hears about it; the user does not for internal failures.
        let messages = chat.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, 777);
        assert!(messages[0].1.contains("dead-lettered after 5 attempt(s)"));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_dead_letters_immediately() {
        let store = InMemoryJobStore::default();
        let job = job();
        let id = job.id;
        store.insert(job);

        let processor = ScriptedProcessor {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
            error: || JobError::ConnectionInvalid("refresh token revoked".to_string()),
        };
        let chat = RecordingChat::default();

        drain(&store, &processor, &chat, &config(Some(777))).await;

        let finished = store.get_sync(id);
        assert_eq!(finished.state, JobState::DeadLettered);
        assert_eq!(finished.attempts, 1);

        // The user gets the reconnect prompt, the operator gets the report.
        let messages = chat.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, 42);
        assert!(messages[0].1.contains("/connect"));
        assert_eq!(messages[1].0, 777);
    }

    #[tokio::test]
    async fn test_reschedule_records_error_and_future_run_at() {
        let store = InMemoryJobStore::default();
        let job = job();
        let id = job.id;
        store.insert(job);

        let processor = ScriptedProcessor {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
            error: || JobError::RecordingNotReady,
        };
        let chat = RecordingChat::default();

        let claimed = store.claim_due(Utc::now(), 1).await.unwrap();
        JobQueue::process_job(
            claimed.into_iter().next().unwrap(),
            &store,
            &processor,
            &chat,
            &config(None),
        )
        .await;

        let rescheduled = store.get_sync(id);
        assert_eq!(rescheduled.state, JobState::Failed);
        assert!(rescheduled.run_at > Utc::now());
        assert_eq!(
            rescheduled.last_error.as_deref(),
            Some("recording not ready for download")
        );
    }
}
