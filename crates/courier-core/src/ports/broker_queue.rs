//! BrokerQueue port - 配送キュー
//!
//! Envelope をそのまま運ぶ multi-consumer FIFO。配送は at-least-once で、
//! dequeue した envelope は visibility timeout の間だけ他の consumer から隠れる。
//! 時間内に ack されなければ再配送される（`delivery_count` が増える）。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DeliveryId, QueueError, TaskEnvelope};

/// One delivery of an envelope to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Receipt to acknowledge this delivery with. Changes on every redelivery.
    pub id: DeliveryId,
    pub envelope: TaskEnvelope,
}

/// BrokerQueue は envelope を worker に配送するためのキュー
///
/// # 設計原則
/// - dequeue は最大 `wait` だけ待つ（shutdown 判定のため無限には待たない）
/// - ack されるまでは in-flight、visibility timeout 経過で再配送
/// - ack は最新の receipt に対してのみ成功する
#[async_trait]
pub trait BrokerQueue: Send + Sync {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<(), QueueError>;

    /// Returns `Ok(None)` when nothing became available within `wait`.
    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: DeliveryId) -> Result<(), QueueError>;
}
