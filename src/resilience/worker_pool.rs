use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::PoolConfig;
use crate::error::AgentError;

/// Coarse load bucket for a [`WorkerPool`], per spec.md section 8: `HIGH`
/// when utilization exceeds 90%, `MEDIUM` above 60%, `LOW` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Low,
    Medium,
    High,
}

fn load_status(active: usize, max: usize) -> LoadStatus {
    if max == 0 {
        return LoadStatus::Low;
    }
    let ratio = active as f64 / max as f64;
    if ratio > 0.9 {
        LoadStatus::High
    } else if ratio > 0.6 {
        LoadStatus::Medium
    } else {
        LoadStatus::Low
    }
}

/// Bounded task executor (spec.md section 4.4). `submit` gates admission
/// with a semaphore sized to `max_size`; fan-out helpers use a
/// [`JoinSet`] so dropping the set (on cancellation of the calling task)
/// aborts every unfinished child for free -- a bare `tokio::spawn` +
/// `Vec<JoinHandle>` would instead leak detached tasks.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    core_size: usize,
    max_size: usize,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_size.max(1))),
            core_size: config.core_size,
            max_size: config.max_size,
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
            queue_capacity: config.queue_capacity,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn pool_size(&self) -> usize {
        self.core_size
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_size
    }

    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn load_status(&self) -> LoadStatus {
        load_status(self.active_count(), self.max_size)
    }

    /// Run `work` once a slot is free. Rejected outright (without
    /// suspending) once the queue is already at `queue_capacity`, matching
    /// spec.md section 4.4's bounded-queue admission rule.
    pub async fn submit<F, Fut, T>(&self, work: F) -> Result<T, AgentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.queued.load(Ordering::SeqCst) >= self.queue_capacity {
            return Err(AgentError::Internal {
                component: "worker_pool".into(),
                message: "submission queue is full".into(),
            });
        }

        self.queued.fetch_add(1, Ordering::SeqCst);
        let permit = self.semaphore.clone().acquire_owned().await;
        self.queued.fetch_sub(1, Ordering::SeqCst);

        let permit = permit.map_err(|_| AgentError::Internal {
            component: "worker_pool".into(),
            message: "pool semaphore closed".into(),
        })?;

        self.active.fetch_add(1, Ordering::SeqCst);
        let result = work().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        Ok(result)
    }

    /// Fan a batch of independent futures out across the pool and join all
    /// of them. Cancelling the caller's own future drops the returned
    /// `join_all` future, which drops the internal `JoinSet`, which aborts
    /// every still-running child -- spec.md section 5's cancellation
    /// propagation requirement (ii).
    pub async fn join_all<F, Fut, T>(&self, works: Vec<F>) -> Vec<Result<T, AgentError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut set: JoinSet<T> = JoinSet::new();
        let semaphore = self.semaphore.clone();
        let active = self.active.clone();

        for work in works {
            let semaphore = semaphore.clone();
            let active = active.clone();
            set.spawn(async move {
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("pool semaphore is never closed");
                active.fetch_add(1, Ordering::SeqCst);
                let result = work().await;
                active.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                result
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            results.push(joined.map_err(|e| AgentError::Internal {
                component: "worker_pool".into(),
                message: format!("task panicked or was cancelled: {e}"),
            }));
        }
        results
    }
}
