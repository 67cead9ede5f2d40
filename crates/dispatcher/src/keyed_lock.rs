use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use orchestrator_core::{OrchestratorError, OrchestratorResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 按键互斥的进程内锁
///
/// 用于同一作用域（任务、轮换作用域）内的串行化；不同键之间互不阻塞。
/// 跨进程的互斥由运行台账的事务保证。
#[derive(Debug)]
pub struct KeyedLock<K> {
    slots: Mutex<HashMap<K, Arc<Semaphore>>>,
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

/// 持有期间该键被占用，释放时自动归还
#[derive(Debug)]
pub struct KeyedLockGuard {
    _permit: OwnedSemaphorePermit,
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &K) -> Arc<Semaphore> {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 释放已无人持有的槽位，避免键无限增长
        slots.retain(|k, sem| k == key || Arc::strong_count(sem) > 1);
        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// 等待并占用 `key`
    pub async fn lock(&self, key: K) -> OrchestratorResult<KeyedLockGuard> {
        let semaphore = self.slot(&key);
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| OrchestratorError::Internal(format!("获取键锁失败: {e}")))?;
        Ok(KeyedLockGuard { _permit: permit })
    }

    /// 当前是否有人持有 `key`
    pub fn is_locked(&self, key: &K) -> bool {
        let slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .get(key)
            .is_some_and(|sem| sem.available_permits() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialised() {
        let locks = Arc::new(KeyedLock::<i64>::new());
        let guard = locks.lock(1).await.unwrap();
        assert!(locks.is_locked(&1));

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(1).await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(!locks.is_locked(&1));
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLock::<(i64, Option<i64>)>::new();
        let _a = locks.lock((1, Some(1))).await.unwrap();
        let _b = locks.lock((1, Some(2))).await.unwrap();
        assert!(locks.is_locked(&(1, Some(1))));
        assert!(locks.is_locked(&(1, Some(2))));
    }
}
