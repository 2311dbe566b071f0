use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

/// Credentials handed out round-robin
#[derive(Debug, Default)]
pub struct ApiKeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl ApiKeyPool {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|k| !k.trim().is_empty()).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key under the cursor; the cursor advances on every call
    pub fn next_key(&self) -> Option<&str> {
        let len = self.keys.len();
        if len == 0 {
            return None;
        }
        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        Some(&self.keys[index % len])
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RotationError<E> {
    /// The pool holds no keys
    NoKeys,
    /// Every key failed on quota; carries the last error
    Exhausted(E),
    /// A non-quota failure stopped the rotation
    Failed(E),
}

/// Run `attempt` with successive keys until it succeeds, at most once per key.
///
/// Quota failures move on to the next key after a jittered exponential delay
/// based on `backoff` (zero disables the delay). Any other failure is returned
/// immediately.
pub async fn rotate<T, E, F, Fut>(
    pool: &ApiKeyPool,
    backoff: Duration,
    is_quota: impl Fn(&E) -> bool,
    mut attempt: F,
) -> Result<T, RotationError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = pool.len();
    let mut last_err = None;

    for n in 0..attempts {
        let Some(key) = pool.next_key() else {
            break;
        };
        match attempt(key.to_string()).await {
            Ok(val) => return Ok(val),
            Err(e) if is_quota(&e) => {
                warn!("Key {}/{attempts} quota exhausted: {e}", n + 1);
                if n + 1 < attempts && !backoff.is_zero() {
                    let delay = jittered(backoff, n as u32);
                    debug!("Trying next key in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(RotationError::Failed(e)),
        }
    }

    Err(last_err.map_or(RotationError::NoKeys, RotationError::Exhausted))
}

fn jittered(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(6)));
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis().min(u64::MAX as u128) as u64);
    exp.saturating_add(Duration::from_millis(jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    enum Fail {
        Quota(String),
        Fatal(String),
    }

    impl std::fmt::Display for Fail {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn pool(n: usize) -> ApiKeyPool {
        ApiKeyPool::new((0..n).map(|i| format!("key-{i}")))
    }

    fn is_quota(e: &Fail) -> bool {
        matches!(e, Fail::Quota(_))
    }

    #[test]
    fn test_next_key_wraps() {
        let pool = pool(3);
        let keys: Vec<_> = (0..7).map(|_| pool.next_key().unwrap().to_string()).collect();
        assert_eq!(keys, ["key-0", "key-1", "key-2", "key-0", "key-1", "key-2", "key-0"]);
    }

    #[test]
    fn test_blank_keys_dropped() {
        let pool = ApiKeyPool::new(vec!["a".to_string(), " ".to_string(), String::new()]);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_empty_pool_has_no_key() {
        assert!(ApiKeyPool::default().next_key().is_none());
    }

    #[test]
    fn test_concurrent_next_key_is_balanced() {
        let pool = std::sync::Arc::new(pool(4));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = std::sync::Arc::clone(&pool);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| pool.next_key().unwrap().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        assert!(counts.values().all(|&c| c == 200));
    }

    #[tokio::test]
    async fn test_all_quota_makes_exactly_n_attempts() {
        let pool = pool(3);
        let seen = Mutex::new(Vec::new());
        let result: Result<(), _> = rotate(&pool, Duration::ZERO, is_quota, |key| {
            seen.lock().unwrap().push(key.clone());
            async move { Err(Fail::Quota(key)) }
        })
        .await;
        assert_eq!(result, Err(RotationError::Exhausted(Fail::Quota("key-2".into()))));
        assert_eq!(*seen.lock().unwrap(), ["key-0", "key-1", "key-2"]);
    }

    #[tokio::test]
    async fn test_success_on_attempt_k() {
        let pool = pool(4);
        let mut calls = 0;
        let result = rotate(&pool, Duration::ZERO, is_quota, |key| {
            calls += 1;
            let ok = calls == 2;
            async move { if ok { Ok(key) } else { Err(Fail::Quota(key)) } }
        })
        .await;
        assert_eq!(result, Ok("key-1".to_string()));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_non_quota_aborts() {
        let pool = pool(3);
        let mut calls = 0;
        let result: Result<(), _> = rotate(&pool, Duration::ZERO, is_quota, |_key| {
            calls += 1;
            async { Err(Fail::Fatal("bad json".into())) }
        })
        .await;
        assert_eq!(result, Err(RotationError::Failed(Fail::Fatal("bad json".into()))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_empty_pool_short_circuits() {
        let mut calls = 0;
        let result: Result<(), RotationError<Fail>> = rotate(&ApiKeyPool::default(), Duration::ZERO, is_quota, |_key| {
            calls += 1;
            async { Ok(()) }
        })
        .await;
        assert_eq!(result, Err(RotationError::NoKeys));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_cursor_shared_across_requests() {
        let pool = pool(2);
        let first = rotate(&pool, Duration::ZERO, is_quota, |key| async move { Ok::<_, Fail>(key) }).await;
        let second = rotate(&pool, Duration::ZERO, is_quota, |key| async move { Ok::<_, Fail>(key) }).await;
        assert_eq!(first, Ok("key-0".to_string()));
        assert_eq!(second, Ok("key-1".to_string()));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(100);
        let d = jittered(base, 2);
        assert!(d >= Duration::from_millis(400) && d <= Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_saturates_on_huge_base() {
        let base = Duration::from_millis(u64::MAX);
        assert_eq!(jittered(base, 6), Duration::MAX);
    }
}
