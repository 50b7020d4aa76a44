//! ResultStore port - handle ごとの TaskRecord を保持する KV ストア
//!
//! # 設計原則
//! - 1 handle につき 1 record、key 単位の put はアトミック
//! - TTL 経過後の record は absent と同じ扱い（get は None を返す）
//! - 明示的な delete はない。回収は store 側の責務

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{StoreError, TaskHandle, TaskRecord};

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store `record` under `handle`, expiring `ttl` from now.
    async fn put(&self, handle: TaskHandle, record: &TaskRecord, ttl: Duration) -> Result<(), StoreError>;

    /// `Ok(None)` for unknown and expired handles alike.
    async fn get(&self, handle: TaskHandle) -> Result<Option<TaskRecord>, StoreError>;

    /// Reclaim expired records, returning how many were dropped.
    ///
    /// Stores with native expiry keep the default no-op.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
