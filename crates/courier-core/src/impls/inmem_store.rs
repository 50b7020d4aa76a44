//! InMemoryResultStore - 開発用の Result Store
//!
//! # 実装詳細
//! - handle -> (JSON にシリアライズした record, expires_at)
//! - 期限は put 時に `clock.now() + ttl` で決まる
//! - get は期限切れを None として返すだけで消さない。回収は purge_expired

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{StoreError, TaskHandle, TaskRecord};
use crate::ports::{Clock, ResultStore, SystemClock};

struct Entry {
    record: String,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryResultStore {
    entries: RwLock<HashMap<TaskHandle, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryResultStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Entries held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn put(&self, handle: TaskHandle, record: &TaskRecord, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let record = serde_json::to_string(record)?;

        self.entries
            .write()
            .await
            .insert(handle, Entry { record, expires_at });
        Ok(())
    }

    async fn get(&self, handle: TaskHandle) -> Result<Option<TaskRecord>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(&handle) {
            Some(entry) if entry.expires_at > now => Ok(Some(serde_json::from_str(&entry.record)?)),
            _ => Ok(None),
        }
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use ulid::Ulid;

    const TTL: Duration = Duration::from_secs(60);

    fn setup() -> (Arc<FixedClock>, InMemoryResultStore) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let store = InMemoryResultStore::new(clock.clone());
        (clock, store)
    }

    fn pending(clock: &FixedClock) -> TaskRecord {
        TaskRecord::pending(
            TaskHandle::from_ulid(Ulid::new()),
            TaskType::new("add"),
            clock.now(),
            TTL,
        )
    }

    #[tokio::test]
    async fn put_then_get_returns_record() {
        let (clock, store) = setup();
        let record = pending(&clock);

        store.put(record.handle, &record, TTL).await.unwrap();
        assert_eq!(store.get(record.handle).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn unknown_handle_is_absent() {
        let (_, store) = setup();
        let handle = TaskHandle::from_ulid(Ulid::new());
        assert!(store.get(handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_record_reads_as_absent_until_purged() {
        let (clock, store) = setup();
        let record = pending(&clock);
        store.put(record.handle, &record, TTL).await.unwrap();

        clock.advance(TTL);
        assert!(store.get(record.handle).await.unwrap().is_none());
        // get は消さない
        assert_eq!(store.len().await, 1);

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn later_put_overwrites_and_resets_expiry_to_given_ttl() {
        let (clock, store) = setup();
        let mut record = pending(&clock);
        store.put(record.handle, &record, TTL).await.unwrap();

        clock.advance(Duration::from_secs(40));
        record.mark_running(clock.now());
        store
            .put(record.handle, &record, record.remaining_ttl(clock.now()))
            .await
            .unwrap();

        let stored = store.get(record.handle).await.unwrap().unwrap();
        assert_eq!(stored.state, crate::domain::TaskState::Running);

        // 作成時の期限はそのまま
        clock.advance(Duration::from_secs(20));
        assert!(store.get(record.handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_keeps_live_records() {
        let (clock, store) = setup();
        let short = pending(&clock);
        let long = pending(&clock);
        store.put(short.handle, &short, Duration::from_secs(1)).await.unwrap();
        store.put(long.handle, &long, TTL).await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get(long.handle).await.unwrap().is_some());
    }
}
