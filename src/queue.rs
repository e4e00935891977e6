use crate::errors::Result;
use crate::input::InputFile;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Work queue shared by the workers of one run.
///
/// `dequeue` hands every job to exactly one caller.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<()>;

    async fn enqueue_batch(&self, jobs: Vec<Job>) -> Result<()> {
        for job in jobs {
            self.enqueue(job).await?;
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>>;
    async fn queue_size(&self) -> Result<usize>;

    /// Drops every job still waiting and reports how many there were.
    async fn clear(&self) -> Result<usize>;
}

/// One input file waiting to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub file_name: String,
    pub input_path: PathBuf,
}

impl Job {
    pub fn new(file_name: impl Into<String>, input_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            input_path: input_path.into(),
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }
}

impl From<InputFile> for Job {
    fn from(file: InputFile) -> Self {
        Self::new(file.file_name, file.path)
    }
}

/// FIFO queue kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobQueue {
    jobs: Arc<Mutex<VecDeque<Job>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        self.jobs.lock().await.push_back(job);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        Ok(self.jobs.lock().await.pop_front())
    }

    async fn queue_size(&self) -> Result<usize> {
        Ok(self.jobs.lock().await.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut jobs = self.jobs.lock().await;
        let dropped = jobs.len();
        jobs.clear();
        Ok(dropped)
    }
}
