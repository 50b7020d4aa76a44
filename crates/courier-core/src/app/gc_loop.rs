//! GcLoop - 期限切れ record の回収
//!
//! `ResultStore::purge_expired` を一定間隔で呼ぶだけ。
//! TTL をネイティブに持つ store では no-op になる。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::ports::ResultStore;

pub struct GcLoop {
    store: Arc<dyn ResultStore>,
    interval: Duration,
}

impl GcLoop {
    pub fn new(store: Arc<dyn ResultStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// One sweep; returns how many records were reclaimed.
    pub async fn sweep(&self) -> usize {
        match self.store.purge_expired().await {
            Ok(0) => 0,
            Ok(purged) => {
                tracing::info!(purged, "reclaimed expired task records");
                purged
            }
            Err(e) => {
                tracing::warn!(error = %e, "purge of expired records failed");
                0
            }
        }
    }

    /// Sweep every `interval` until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskHandle, TaskRecord, TaskType};
    use crate::impls::InMemoryResultStore;
    use crate::ports::{Clock, FixedClock};
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    #[tokio::test]
    async fn sweep_reclaims_only_expired_records() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(InMemoryResultStore::new(clock.clone()));
        for ttl in [1, 1, 600] {
            let ttl = Duration::from_secs(ttl);
            let record = TaskRecord::pending(
                TaskHandle::from_ulid(Ulid::new()),
                TaskType::new("add"),
                clock.now(),
                ttl,
            );
            store.put(record.handle, &record, ttl).await.unwrap();
        }

        let gc = GcLoop::new(store.clone(), Duration::from_secs(60));
        assert_eq!(gc.sweep().await, 0);

        clock.advance(Duration::from_secs(5));
        assert_eq!(gc.sweep().await, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let gc = GcLoop::new(Arc::new(InMemoryResultStore::default()), Duration::from_secs(1));
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn(async move { gc.run(rx).await });

        tokio::time::sleep(Duration::from_secs(3)).await;
        tx.send(true).unwrap();
        join.await.unwrap();
    }
}
