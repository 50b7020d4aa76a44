//! InMemoryBrokerQueue - 開発用の配送キュー
//!
//! # 実装詳細
//! - ready: JSON にシリアライズした envelope の VecDeque（FIFO）
//! - in_flight: DeliveryId -> (envelope, visible_at)
//! - dequeue のたびに visible_at を過ぎた in-flight を ready の先頭に戻す
//! - tokio の Mutex + Notify で blocking dequeue

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{DeliveryId, QueueError, TaskEnvelope};
use crate::ports::{BrokerQueue, Delivery, IdGenerator, SystemClock, UlidGenerator};

/// Default visibility timeout when none is configured.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

struct InFlight {
    envelope: String,
    visible_at: Instant,
}

enum Poll {
    Ready(Delivery),
    Empty { next_visible: Option<Instant> },
}

#[derive(Default)]
struct BrokerState {
    ready: VecDeque<String>,
    in_flight: HashMap<DeliveryId, InFlight>,
}

impl BrokerState {
    /// Move deliveries whose visibility timeout passed back to the head of `ready`.
    fn requeue_expired(&mut self, now: Instant) -> usize {
        let mut expired: Vec<(DeliveryId, Instant)> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(id, f)| (*id, f.visible_at))
            .collect();
        // 古いものほど先頭に来るように、新しい順に push_front する
        expired.sort_by_key(|(_, at)| std::cmp::Reverse(*at));

        let count = expired.len();
        for (id, _) in expired {
            if let Some(flight) = self.in_flight.remove(&id) {
                tracing::debug!(delivery = %id, "visibility timeout passed, redelivering");
                self.ready.push_front(flight.envelope);
            }
        }
        count
    }

    fn next_visible_at(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.visible_at).min()
    }
}

/// Ready / in-flight counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BrokerStats {
    pub ready: usize,
    pub in_flight: usize,
}

/// InMemoryBrokerQueue は開発用・テスト用の Broker Queue
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryBrokerQueue::new(Duration::from_secs(30));
/// queue.enqueue(envelope).await?;
/// if let Some(delivery) = queue.dequeue(Duration::from_secs(1)).await? {
///     queue.ack(delivery.id).await?;
/// }
/// ```
pub struct InMemoryBrokerQueue {
    state: Mutex<BrokerState>,
    notify: Notify,
    visibility_timeout: Duration,
    ids: Box<dyn IdGenerator>,
}

impl InMemoryBrokerQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            notify: Notify::new(),
            visibility_timeout,
            ids: Box::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    pub async fn stats(&self) -> BrokerStats {
        let state = self.state.lock().await;
        BrokerStats {
            ready: state.ready.len(),
            in_flight: state.in_flight.len(),
        }
    }

    /// Try to hand out one envelope; otherwise report when to look again.
    async fn try_dequeue(&self) -> Result<Poll, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.requeue_expired(now);

        let Some(raw) = state.ready.pop_front() else {
            return Ok(Poll::Empty {
                next_visible: state.next_visible_at(),
            });
        };

        let mut envelope: TaskEnvelope = serde_json::from_str(&raw)?;
        envelope.record_delivery();

        let id = self.ids.generate_delivery_id();
        state.in_flight.insert(
            id,
            InFlight {
                envelope: serde_json::to_string(&envelope)?,
                visible_at: now + self.visibility_timeout,
            },
        );
        Ok(Poll::Ready(Delivery { id, envelope }))
    }
}

impl Default for InMemoryBrokerQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}

#[async_trait]
impl BrokerQueue for InMemoryBrokerQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<(), QueueError> {
        let raw = serde_json::to_string(&envelope)?;
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(raw);
        }
        // ロックを外してから通知する
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            let next_visible = match self.try_dequeue().await? {
                Poll::Ready(delivery) => return Ok(Some(delivery)),
                Poll::Empty { next_visible } => next_visible,
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // push の通知か、次の in-flight が見えるようになる時刻か、deadline のどれか
            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn ack(&self, delivery: DeliveryId) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.in_flight.remove(&delivery) {
            Some(_) => Ok(()),
            None => Err(QueueError::UnknownDelivery(delivery)),
        }
    }
}
