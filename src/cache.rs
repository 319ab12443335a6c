// SPDX-License-Identifier: MIT

//! Single-flight TTL caching primitives.
//!
//! [`CachedValue`] wraps an async compute function and serves its last good
//! result until `refresh` has elapsed. At most one recomputation per value
//! is ever in flight: concurrent callers either get the stale value or wait
//! and observe the in-flight result, value and failure alike. A semaphore —
//! shareable across the values of a keyed cache — additionally bounds how
//! many recomputations run at once. After a failed compute, no new attempt
//! is made until `retry` has elapsed; the stale value (if any) keeps being
//! served and the failure propagates only when no prior good value exists.

use crate::error::{AppError, Result};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};

/// Refresh/retry policy for a cached value.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// How long a good value is served before a recompute is triggered.
    pub refresh: Duration,
    /// How long to wait after a failed compute before trying again.
    pub retry: Duration,
    /// Upper bound on concurrently running compute attempts across the
    /// values sharing one semaphore (per value it is always one).
    pub max_simultaneous_compute: usize,
}

impl CacheConfig {
    /// Semaphore to share across the values of a keyed cache.
    pub fn shared_semaphore(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.max_simultaneous_compute))
    }
}

type Compute<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

struct CacheState<T> {
    value: Option<(T, Instant)>,
    last_error: Option<(Arc<AppError>, Instant)>,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            value: None,
            last_error: None,
        }
    }
}

/// A lazily recomputed value with single-flight coalescing.
pub struct CachedValue<T> {
    config: CacheConfig,
    compute: Compute<T>,
    state: RwLock<CacheState<T>>,
    /// Serializes recomputation of this value.
    flight: Mutex<()>,
    /// Bounds recomputation across a family of values.
    compute_permits: Arc<Semaphore>,
}

enum Plan<T> {
    Done(Result<T>),
    Recompute,
}

impl<T: Clone + Send + Sync + 'static> CachedValue<T> {
    pub fn new<F>(config: CacheConfig, compute: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        let permits = config.shared_semaphore();
        Self::with_semaphore(config, permits, compute)
    }

    /// Build a value whose recomputation shares `permits` with its siblings
    /// in a keyed cache.
    pub fn with_semaphore<F>(config: CacheConfig, permits: Arc<Semaphore>, compute: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        Self {
            config,
            compute: Box::new(compute),
            state: RwLock::new(CacheState::default()),
            flight: Mutex::new(()),
            compute_permits: permits,
        }
    }

    /// Get the cached value, recomputing per the refresh/retry policy.
    pub async fn get(&self) -> Result<T> {
        let started = Instant::now();

        if let Plan::Done(result) = self.plan(None).await {
            return result;
        }

        match self.flight.try_lock() {
            Ok(_guard) => self.recompute(started).await,
            Err(_) => {
                // Another caller is already computing. Stale data answers
                // immediately; otherwise wait and share its outcome.
                if let Some(value) = self.stale_value().await {
                    return Ok(value);
                }
                let _guard = self.flight.lock().await;
                if let Plan::Done(result) = self.plan(Some(started)).await {
                    return result;
                }
                self.recompute(started).await
            }
        }
    }

    /// Decide whether the current state answers the call directly.
    ///
    /// `since` marks the start of a waiting caller's attempt: any value or
    /// failure recorded after it counts as the result of the compute that
    /// caller was waiting on.
    async fn plan(&self, since: Option<Instant>) -> Plan<T> {
        let state = self.state.read().await;

        if let Some((ref value, refreshed_at)) = state.value {
            let fresh_enough = refreshed_at.elapsed() < self.config.refresh
                || since.is_some_and(|s| refreshed_at >= s);
            if fresh_enough {
                return Plan::Done(Ok(value.clone()));
            }
        }

        if let Some((ref err, failed_at)) = state.last_error {
            let within_retry = failed_at.elapsed() < self.config.retry;
            let observed_failure = since.is_some_and(|s| failed_at >= s);
            if within_retry || observed_failure {
                // Stale value wins over a recent failure.
                return match state.value {
                    Some((ref value, _)) => Plan::Done(Ok(value.clone())),
                    None => Plan::Done(Err(clone_failure(err))),
                };
            }
        }

        Plan::Recompute
    }

    async fn stale_value(&self) -> Option<T> {
        self.state
            .read()
            .await
            .value
            .as_ref()
            .map(|(value, _)| value.clone())
    }

    /// Run the compute function and record its outcome. Caller must hold
    /// the flight lock.
    async fn recompute(&self, started: Instant) -> Result<T> {
        // Double-check after acquiring: the previous holder may have
        // finished between our plan() and the lock.
        if let Plan::Done(result) = self.plan(Some(started)).await {
            return result;
        }

        let _permit = self
            .compute_permits
            .acquire()
            .await
            .expect("cache semaphore closed");

        let outcome = (self.compute)().await;
        let mut state = self.state.write().await;
        match outcome {
            Ok(value) => {
                state.value = Some((value.clone(), Instant::now()));
                state.last_error = None;
                Ok(value)
            }
            Err(err) => {
                let err = Arc::new(err);
                state.last_error = Some((err.clone(), Instant::now()));
                match state.value {
                    Some((ref value, _)) => Ok(value.clone()),
                    None => Err(clone_failure(&err)),
                }
            }
        }
    }
}

/// Rebuild a stored failure for a new caller, variant and message intact.
fn clone_failure(err: &AppError) -> AppError {
    match err {
        AppError::Unauthorized(msg) => AppError::Unauthorized(msg.clone()),
        AppError::InvalidToken => AppError::InvalidToken,
        AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
        AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
        AppError::BadGateway(msg) => AppError::BadGateway(msg.clone()),
        AppError::ServiceUnavailable(msg) => AppError::ServiceUnavailable(msg.clone()),
        AppError::Io(msg) => AppError::Io(msg.clone()),
        AppError::IllegalState(msg) => AppError::IllegalState(msg.clone()),
        AppError::Database(msg) => AppError::Database(msg.clone()),
        AppError::Internal(err) => AppError::ServiceUnavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(refresh_ms: u64, retry_ms: u64, max: usize) -> CacheConfig {
        CacheConfig {
            refresh: Duration::from_millis(refresh_ms),
            retry: Duration::from_millis(retry_ms),
            max_simultaneous_compute: max,
        }
    }

    #[tokio::test]
    async fn serves_value_without_recompute_within_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let cache = CachedValue::new(config(10_000, 100, 1), move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42u32)
            }
            .boxed()
        });

        assert_eq!(cache.get().await.unwrap(), 42);
        assert_eq!(cache.get().await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_without_prior_value_propagates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let cache: CachedValue<u32> = CachedValue::new(config(10_000, 10_000, 1), move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::ServiceUnavailable("broker down".to_string()))
            }
            .boxed()
        });

        assert!(matches!(
            cache.get().await,
            Err(AppError::ServiceUnavailable(_))
        ));
        // Within the retry window the failure is replayed, not recomputed.
        assert!(matches!(
            cache.get().await,
            Err(AppError::ServiceUnavailable(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_after_good_value_serves_stale() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let cache = CachedValue::new(config(20, 10_000, 1), move || {
            let calls = calls_in.clone();
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok(7u32),
                    _ => Err(AppError::ServiceUnavailable("broker down".to_string())),
                }
            }
            .boxed()
        });

        assert_eq!(cache.get().await.unwrap(), 7);
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Value is stale; recompute fails; stale value still served.
        assert_eq!(cache.get().await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Within the retry window, no further compute attempts happen.
        assert_eq!(cache.get().await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn recovers_after_retry_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let cache = CachedValue::new(config(10_000, 20, 1), move || {
            let calls = calls_in.clone();
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(AppError::ServiceUnavailable("broker down".to_string())),
                    _ => Ok(9u32),
                }
            }
            .boxed()
        });

        assert!(cache.get().await.is_err());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_into_one_compute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        // Three permits, but per-value single flight still coalesces.
        let cache = Arc::new(CachedValue::new(config(10_000, 100, 3), move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(11u32)
            }
            .boxed()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 11);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_an_in_flight_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let cache: Arc<CachedValue<u32>> =
            Arc::new(CachedValue::new(config(10_000, 10_000, 2), move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(AppError::ServiceUnavailable("broker down".to_string()))
                }
                .boxed()
            }));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await })
            })
            .collect();

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(AppError::ServiceUnavailable(_))
            ));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shared_semaphore_bounds_computes_across_values() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let cfg = config(10_000, 100, 2);
        let permits = cfg.shared_semaphore();

        let caches: Vec<Arc<CachedValue<u32>>> = (0..6u32)
            .map(|i| {
                let concurrent = concurrent.clone();
                let peak = peak.clone();
                Arc::new(CachedValue::with_semaphore(cfg, permits.clone(), move || {
                    let concurrent = concurrent.clone();
                    let peak = peak.clone();
                    async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    }
                    .boxed()
                }))
            })
            .collect();

        let handles: Vec<_> = caches
            .iter()
            .map(|cache| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
