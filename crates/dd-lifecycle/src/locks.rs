use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per key. Work for the same order or domain is serialized,
/// distinct keys run in parallel.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Drop entries nobody holds or waits on.
            map.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
            map.entry(key.to_string()).or_default().clone()
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = KeyedLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (locks, active, peak) = (locks.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("ord_1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        let _c = locks.lock("c").await;
        assert_eq!(locks.tracked(), 1);
    }
}
