//! Job execution backends
//!
//! An [`Executor`] runs a function over a batch of independent jobs and
//! reports back once all of them finished. Results come back in job order;
//! the first failing job fails the whole batch.

use crate::error::{DatasetError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Maps a function over jobs
#[async_trait]
pub trait Executor: Send + Sync {
    async fn map<J, R, F, Fut>(&self, f: F, jobs: Vec<J>) -> Result<Vec<R>>
    where
        J: Send + 'static,
        R: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static;
}

/// Runs jobs one after another on the calling task
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

#[async_trait]
impl Executor for SequentialExecutor {
    async fn map<J, R, F, Fut>(&self, f: F, jobs: Vec<J>) -> Result<Vec<R>>
    where
        J: Send + 'static,
        R: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(f(job).await?);
        }
        Ok(results)
    }
}

/// Runs jobs as tokio tasks, at most `workers` at a time
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    workers: usize,
}

impl ParallelExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for ParallelExecutor {
    /// One worker per available CPU
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(workers)
    }
}

#[async_trait]
impl Executor for ParallelExecutor {
    async fn map<J, R, F, Fut>(&self, f: F, jobs: Vec<J>) -> Result<Vec<R>>
    where
        J: Send + 'static,
        R: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let total = jobs.len();
        debug!("Running {} job(s) on {} worker(s)", total, self.workers);

        let f = Arc::new(f);
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| DatasetError::Executor(e.to_string()))?;
                f(job).await.map(|result| (index, result))
            });
        }

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| DatasetError::Executor(format!("job did not complete: {}", e)))
                .and_then(|outcome| outcome);
            match outcome {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.ok_or_else(|| DatasetError::Executor("job produced no result".to_string()))
            })
            .collect()
    }
}

/// Either executor, picked at runtime
#[derive(Debug, Clone, Copy)]
pub enum AnyExecutor {
    Sequential(SequentialExecutor),
    Parallel(ParallelExecutor),
}

#[async_trait]
impl Executor for AnyExecutor {
    async fn map<J, R, F, Fut>(&self, f: F, jobs: Vec<J>) -> Result<Vec<R>>
    where
        J: Send + 'static,
        R: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        match self {
            AnyExecutor::Sequential(executor) => executor.map(f, jobs).await,
            AnyExecutor::Parallel(executor) => executor.map(f, jobs).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn square(n: u64) -> Result<u64> {
        // later jobs finish first
        tokio::time::sleep(Duration::from_millis(20 - n * 2)).await;
        Ok(n * n)
    }

    #[tokio::test]
    async fn test_results_keep_job_order() {
        let jobs: Vec<u64> = (0..8).collect();
        let expected: Vec<u64> = jobs.iter().map(|n| n * n).collect();

        let sequential = SequentialExecutor.map(square, jobs.clone()).await.unwrap();
        assert_eq!(sequential, expected);
        let parallel = ParallelExecutor::new(4).map(square, jobs).await.unwrap();
        assert_eq!(parallel, expected);
    }

    #[tokio::test]
    async fn test_worker_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (running_in, peak_in) = (Arc::clone(&running), Arc::clone(&peak));

        ParallelExecutor::new(2)
            .map(
                move |_: usize| {
                    let running = Arc::clone(&running_in);
                    let peak = Arc::clone(&peak_in);
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                (0..6).collect(),
            )
            .await
            .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_job_fails_the_batch() {
        let fail_on_three = |n: u32| async move {
            if n == 3 {
                Err(DatasetError::Storage(format!("job {} failed", n)))
            } else {
                Ok(n)
            }
        };
        let executor = AnyExecutor::Parallel(ParallelExecutor::new(3));
        assert!(matches!(
            executor.map(fail_on_three, (0..10).collect()).await,
            Err(DatasetError::Storage(_))
        ));
        assert!(SequentialExecutor
            .map(fail_on_three, (0..10).collect())
            .await
            .is_err());
    }
}
