//! Test fixtures shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::domain::{DeliveryId, HandlerError, QueueError, StoreError, TaskEnvelope, TaskHandle, TaskRecord};
use crate::impls::{InMemoryBrokerQueue, InMemoryResultStore};
use crate::ports::{BrokerQueue, Delivery, ResultStore};
use crate::typed::{Handler, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTask {
    pub x: i64,
    pub y: i64,
}

impl Task for AddTask {
    const TYPE: &'static str = "add";
    type Output = i64;
}

/// Adds, counting how many times it ran.
#[derive(Default, Clone)]
pub struct AddHandler {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler<AddTask> for AddHandler {
    async fn handle(&self, task: AddTask) -> Result<i64, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(task.x + task.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailingTask {
    pub reason: String,
}

impl Task for FailingTask {
    const TYPE: &'static str = "reject";
    type Output = ();
}

pub struct FailingHandler;

#[async_trait]
impl Handler<FailingTask> for FailingHandler {
    async fn handle(&self, task: FailingTask) -> Result<(), HandlerError> {
        Err(HandlerError::new("Rejected", task.reason))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanickingTask {}

impl Task for PanickingTask {
    const TYPE: &'static str = "explode";
    type Output = ();
}

pub struct PanickingHandler;

#[async_trait]
impl Handler<PanickingTask> for PanickingHandler {
    async fn handle(&self, _task: PanickingTask) -> Result<(), HandlerError> {
        panic!("handler blew up");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedTask {
    pub value: i64,
}

impl Task for GatedTask {
    const TYPE: &'static str = "gated";
    type Output = i64;
}

/// 1 回目の呼び出しだけ `gate` が開くまで止まり、成功する。
/// 2 回目以降はすぐに失敗する。
#[derive(Default, Clone)]
pub struct GatedHandler {
    pub entered: Arc<Notify>,
    pub gate: Arc<Notify>,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler<GatedTask> for GatedHandler {
    async fn handle(&self, task: GatedTask) -> Result<i64, HandlerError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(HandlerError::new("Busy", "another run holds the gate"));
        }
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(task.value)
    }
}

/// In-memory broker that can be taken offline and counts enqueues.
#[derive(Default)]
pub struct FlakyBroker {
    pub inner: InMemoryBrokerQueue,
    pub offline: AtomicBool,
    pub enqueued: AtomicUsize,
    pub acks: AtomicUsize,
}

impl FlakyBroker {
    pub fn offline() -> Self {
        let broker = Self::default();
        broker.offline.store(true, Ordering::SeqCst);
        broker
    }

    fn check(&self) -> Result<(), QueueError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerQueue for FlakyBroker {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<(), QueueError> {
        self.check()?;
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        self.inner.enqueue(envelope).await
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        self.check()?;
        self.inner.dequeue(wait).await
    }

    async fn ack(&self, delivery: DeliveryId) -> Result<(), QueueError> {
        self.check()?;
        self.acks.fetch_add(1, Ordering::SeqCst);
        self.inner.ack(delivery).await
    }
}

/// In-memory store that counts writes and can refuse them.
pub struct CountingStore {
    pub inner: InMemoryResultStore,
    pub puts: AtomicUsize,
    pub reject_puts: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: InMemoryResultStore) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            reject_puts: AtomicBool::new(false),
        }
    }
}

impl Default for CountingStore {
    fn default() -> Self {
        Self::new(InMemoryResultStore::default())
    }
}

#[async_trait]
impl ResultStore for CountingStore {
    async fn put(&self, handle: TaskHandle, record: &TaskRecord, ttl: Duration) -> Result<(), StoreError> {
        if self.reject_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timeout".to_string()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(handle, record, ttl).await
    }

    async fn get(&self, handle: TaskHandle) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.get(handle).await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.inner.purge_expired().await
    }
}
