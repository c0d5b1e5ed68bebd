use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{
    sync::Mutex as AsyncMutex,
    time::{sleep, Duration},
};

use common::{database::DbPool, utils::error::ApiError};

pub mod progress;

const MAX_JOB_TYPES: usize = 3;
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Job: Send + Sync + 'static {
    async fn execute(&self, pool: &DbPool) -> Result<(), JobError>;
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("External API error: {0}")]
    ExternalApi(String),
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Other error: {0}")]
    Other(String),
}

impl From<ApiError> for JobError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Database(msg) => Self::Database(msg),
            ApiError::Embedding(msg) => Self::Embedding(msg),
            ApiError::ExternalApi(msg) => Self::ExternalApi(msg),
            ApiError::RateLimit { message, .. } => Self::ExternalApi(message),
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for JobError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    job_locks: Arc<DashMap<String, Arc<AsyncMutex<()>>>>,
    pool: Arc<DbPool>,
}

impl JobScheduler {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self {
            jobs: Vec::with_capacity(MAX_JOB_TYPES),
            job_locks: Arc::new(DashMap::with_capacity(MAX_JOB_TYPES)),
            pool,
        }
    }

    fn get_job_lock(&self, job_name: &str) -> Arc<AsyncMutex<()>> {
        self.job_locks
            .entry(job_name.to_owned())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub fn reserve_jobs(&mut self, additional: usize) {
        self.jobs.reserve(additional);
    }

    pub fn add_job(&mut self, job: Arc<dyn Job>) {
        self.jobs.push(job);
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    pub async fn run_all_sequential(&self) -> Result<(), JobError> {
        for job in &self.jobs {
            tracing::info!("Starting job: {}", job.name());
            job.execute(&self.pool).await?;
            tracing::info!("Completed job: {}", job.name());
        }
        Ok(())
    }

    /// Runs `job` forever, `interval` apart. A failing run is retried a few
    /// times before the scheduler waits for the next tick.
    pub async fn run_recurring(
        &self,
        job: Arc<dyn Job>,
        interval: Duration,
    ) -> Result<(), JobError> {
        loop {
            {
                let job_lock = self.get_job_lock(job.name());
                let _guard = job_lock.lock().await;

                tracing::info!("Starting recurring job: {}", job.name());

                let mut attempts = 0;
                loop {
                    attempts += 1;
                    match job.execute(&self.pool).await {
                        Ok(()) => {
                            tracing::info!("Completed recurring job: {}", job.name());
                            break;
                        }
                        Err(e) if attempts < MAX_RETRIES => {
                            tracing::warn!(
                                "Failed recurring job {} (attempt {}/{}): {}. Retrying in {:?}",
                                job.name(),
                                attempts,
                                MAX_RETRIES,
                                e,
                                RETRY_DELAY
                            );
                            sleep(RETRY_DELAY).await;
                        }
                        Err(e) => {
                            tracing::error!(
                                "Failed recurring job {} after {} attempts: {}",
                                job.name(),
                                MAX_RETRIES,
                                e
                            );
                            break;
                        }
                    }
                }
            }

            sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_their_category() {
        let err: JobError = ApiError::Database("connection refused".into()).into();
        assert!(matches!(err, JobError::Database(msg) if msg == "connection refused"));

        let err: JobError = ApiError::RateLimit {
            retry_after: 5,
            message: "slow down".into(),
        }
        .into();
        assert!(matches!(err, JobError::ExternalApi(msg) if msg == "slow down"));

        let err: JobError = ApiError::Config("HF_API_KEY not set".into()).into();
        assert!(matches!(err, JobError::Other(_)));
    }
}
