use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

/// 进程内正在执行的运行实例 -> 取消令牌
///
/// 取消的权威状态在运行台账中（`running -> cancelled` 的条件更新）；
/// 这里的令牌只用于尽快通知本进程内仍在执行的备份策略和退避等待。
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<i64, CancellationToken>> {
        match self.tokens.lock() {
            Ok(tokens) => tokens,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 为运行实例登记令牌；已登记时返回原令牌
    pub fn register(&self, run_id: i64) -> CancellationToken {
        self.tokens().entry(run_id).or_default().clone()
    }

    /// 触发令牌，返回该运行实例是否在本进程内执行
    pub fn cancel(&self, run_id: i64) -> bool {
        match self.tokens().get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, run_id: i64) {
        self.tokens().remove(&run_id);
    }

    pub fn in_flight(&self) -> usize {
        self.tokens().len()
    }

    pub fn contains(&self, run_id: i64) -> bool {
        self.tokens().contains_key(&run_id)
    }
}
