//! Concurrency limiting for executions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{Result, RunnerError};

/// What happens to a request when every execution slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Wait for a slot to free up.
    #[default]
    Queue,
    /// Fail immediately with [`RunnerError::Busy`].
    Reject,
}

#[derive(Debug, Default)]
struct Counters {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Bounds the number of in-flight executions and tracks usage.
#[derive(Debug, Clone)]
pub struct ExecutionLimiter {
    semaphore: Option<Arc<Semaphore>>,
    limit: Option<usize>,
    policy: AdmissionPolicy,
    counters: Arc<Counters>,
}

impl ExecutionLimiter {
    /// Create a limiter. `None` means no bound.
    pub fn new(limit: Option<usize>, policy: AdmissionPolicy) -> Self {
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n))),
            limit,
            policy,
            counters: Arc::default(),
        }
    }

    /// A limiter that admits everything.
    pub fn unbounded() -> Self {
        Self::new(None, AdmissionPolicy::Queue)
    }

    /// Acquire an execution slot according to the admission policy.
    pub async fn acquire(&self) -> Result<ExecutionPermit> {
        let permit = match (&self.semaphore, self.policy) {
            (None, _) => None,
            (Some(semaphore), AdmissionPolicy::Queue) => {
                let permit = Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| RunnerError::Config("execution limiter closed".to_string()))?;
                Some(permit)
            }
            (Some(semaphore), AdmissionPolicy::Reject) => {
                match Arc::clone(semaphore).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(TryAcquireError::NoPermits) => {
                        return Err(RunnerError::Busy {
                            limit: self.limit.unwrap_or_default(),
                        })
                    }
                    Err(TryAcquireError::Closed) => {
                        return Err(RunnerError::Config("execution limiter closed".to_string()))
                    }
                }
            }
        };

        let current = self.counters.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(current, Ordering::SeqCst);

        Ok(ExecutionPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Number of executions currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.counters.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous executions observed.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// The configured bound, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// An execution slot, released on drop.
#[derive(Debug)]
pub struct ExecutionPermit {
    _permit: Option<OwnedSemaphorePermit>,
    counters: Arc<Counters>,
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.counters.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unbounded_tracks_peak() {
        let limiter = ExecutionLimiter::unbounded();
        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);
        drop(a);
        drop(b);
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.peak(), 2);
    }

    #[tokio::test]
    async fn test_reject_when_full() {
        let limiter = ExecutionLimiter::new(Some(1), AdmissionPolicy::Reject);
        let held = limiter.acquire().await.unwrap();

        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, RunnerError::Busy { limit: 1 }));

        drop(held);
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_waits_for_slot() {
        let limiter = ExecutionLimiter::new(Some(1), AdmissionPolicy::Queue);
        let held = limiter.acquire().await.unwrap();

        let waiting = limiter.clone();
        let handle = tokio::spawn(async move { waiting.acquire().await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        drop(held);
        handle.await.unwrap().unwrap();
        assert_eq!(limiter.peak(), 1);
    }
}
