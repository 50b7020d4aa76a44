//! StatusResolver - handle から現在の TaskRecord を引く読み取り専用の経路
//!
//! 存在しない handle と TTL 切れの handle は区別しない（どちらも None）。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{StoreError, TaskHandle, TaskRecord};
use crate::ports::ResultStore;

/// WaitError は `StatusResolver::wait` のエラー
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("task {0} is unknown or expired")]
    Absent(TaskHandle),

    #[error("task {handle} did not finish within {timeout:?}")]
    TimedOut { handle: TaskHandle, timeout: Duration },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct StatusResolver {
    store: Arc<dyn ResultStore>,
}

impl StatusResolver {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Current record, or `None` for unknown and expired handles.
    pub async fn status(&self, handle: TaskHandle) -> Result<Option<TaskRecord>, StoreError> {
        self.store.get(handle).await
    }

    /// Poll every `poll` until the record is terminal or `timeout` elapses.
    pub async fn wait(
        &self,
        handle: TaskHandle,
        poll: Duration,
        timeout: Duration,
    ) -> Result<TaskRecord, WaitError> {
        let deadline = Instant::now() + timeout;
        loop {
            let record = self.status(handle).await?.ok_or(WaitError::Absent(handle))?;
            if record.is_terminal() {
                return Ok(record);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::TimedOut { handle, timeout });
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskState, TaskType};
    use crate::impls::InMemoryResultStore;
    use crate::ports::{Clock, FixedClock};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use ulid::Ulid;

    const TTL: Duration = Duration::from_secs(60);

    fn setup() -> (Arc<FixedClock>, Arc<InMemoryResultStore>, StatusResolver) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(InMemoryResultStore::new(clock.clone()));
        let resolver = StatusResolver::new(store.clone());
        (clock, store, resolver)
    }

    async fn seed(clock: &FixedClock, store: &InMemoryResultStore) -> TaskRecord {
        let record = TaskRecord::pending(
            TaskHandle::from_ulid(Ulid::new()),
            TaskType::new("add"),
            clock.now(),
            TTL,
        );
        store.put(record.handle, &record, TTL).await.unwrap();
        record
    }

    #[tokio::test]
    async fn never_issued_and_expired_handles_are_both_absent() {
        let (clock, store, resolver) = setup();
        let record = seed(&clock, &store).await;

        assert!(resolver.status(record.handle).await.unwrap().is_some());
        assert!(
            resolver
                .status(TaskHandle::from_ulid(Ulid::new()))
                .await
                .unwrap()
                .is_none()
        );

        clock.advance(TTL);
        assert!(resolver.status(record.handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_is_a_pure_read() {
        let (clock, store, resolver) = setup();
        let record = seed(&clock, &store).await;

        let a = resolver.status(record.handle).await.unwrap();
        let b = resolver.status(record.handle).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Some(record));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_once_terminal() {
        let (clock, store, resolver) = setup();
        let mut record = seed(&clock, &store).await;
        let handle = record.handle;

        let writer = tokio::spawn({
            let store = store.clone();
            let clock = clock.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                record.mark_running(clock.now());
                record.mark_succeeded(json!(12), clock.now()).unwrap();
                store.put(record.handle, &record, TTL).await.unwrap();
            }
        });

        let done = resolver
            .wait(handle, Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.state, TaskState::Success);
        assert_eq!(done.result, Some(json!(12)));
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_on_pending() {
        let (clock, store, resolver) = setup();
        let record = seed(&clock, &store).await;

        let err = resolver
            .wait(record.handle, Duration::from_millis(50), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::TimedOut { handle, .. } if handle == record.handle));
    }

    #[tokio::test]
    async fn wait_on_unknown_handle_is_absent() {
        let (_, _, resolver) = setup();
        let handle = TaskHandle::from_ulid(Ulid::new());

        let err = resolver
            .wait(handle, Duration::from_millis(10), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Absent(h) if h == handle));
    }
}
