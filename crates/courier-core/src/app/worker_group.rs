use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::worker_loop::WorkerLoop;

/// Worker group handle.
/// - 全ワーカーは同じ shutdown 信号を見る
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn one tokio task per worker.
    pub fn spawn(workers: impl IntoIterator<Item = WorkerLoop>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = workers
            .into_iter()
            .map(|worker| {
                let rx = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(rx).await })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// 実行中の handler はキャンセルしない。新しい envelope を取らなくなるだけ。
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::worker_loop::WorkerSettings;
    use crate::domain::{TaskEnvelope, TaskRecord, TaskState, TaskType};
    use crate::impls::{InMemoryBrokerQueue, InMemoryResultStore};
    use crate::ports::{BrokerQueue, Clock, IdGenerator, ResultStore, SystemClock, UlidGenerator};
    use crate::testing::{AddHandler, AddTask};
    use crate::typed::TaskRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_workers_stop_on_shutdown() {
        let registry = Arc::new(TaskRegistry::new());
        let queue = Arc::new(InMemoryBrokerQueue::default());
        let store = Arc::new(InMemoryResultStore::default());
        let settings = WorkerSettings {
            dequeue_wait: Duration::from_secs(30),
            ..WorkerSettings::default()
        };

        let group = WorkerGroup::spawn((0..3).map(|id| {
            WorkerLoop::new(
                id,
                registry.clone(),
                queue.clone(),
                store.clone(),
                Arc::new(SystemClock),
                settings.clone(),
            )
        }));
        assert_eq!(group.len(), 3);

        // dequeue_wait より十分早く止まる
        tokio::time::timeout(Duration::from_secs(5), group.shutdown_and_join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn group_workers_drain_the_queue() {
        let add = AddHandler::default();
        let mut registry = TaskRegistry::new();
        registry.register::<AddTask, _>(add.clone()).unwrap();
        let registry = Arc::new(registry);
        let queue = Arc::new(InMemoryBrokerQueue::default());
        let store = Arc::new(InMemoryResultStore::default());
        let ids = UlidGenerator::new(SystemClock);
        let ttl = Duration::from_secs(60);

        let mut handles = Vec::new();
        for i in 0..4 {
            let handle = ids.generate_handle();
            let now = SystemClock.now();
            let record = TaskRecord::pending(handle, TaskType::new("add"), now, ttl);
            store.put(handle, &record, ttl).await.unwrap();
            let envelope = TaskEnvelope::new(handle, TaskType::new("add"), json!({ "x": i, "y": 1 }), now);
            queue.enqueue(envelope).await.unwrap();
            handles.push(handle);
        }

        let group = WorkerGroup::spawn((0..2).map(|id| {
            WorkerLoop::new(
                id,
                registry.clone(),
                queue.clone(),
                store.clone(),
                Arc::new(SystemClock),
                WorkerSettings::default(),
            )
        }));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        for handle in &handles {
            loop {
                let record = store.get(*handle).await.unwrap().unwrap();
                if record.is_terminal() {
                    assert_eq!(record.state, TaskState::Success);
                    break;
                }
                assert!(tokio::time::Instant::now() < deadline, "group did not drain the queue");
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        group.shutdown_and_join().await;
        assert_eq!(add.calls.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(queue.stats().await.in_flight, 0);
    }
}
