//! Errors - エラー型と分類
//!
//! インフラ系（Broker Queue / Result Store）のエラーと、Handler が返すエラー。
//! Dispatcher や Registry 固有のエラーはそれぞれのモジュールにある。

use super::{DeliveryId, ErrorKind, TaskError};

/// Broker Queue のエラー
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Broker に到達できない（一時的）
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// ack された receipt がもう in-flight ではない（再配送済み、または ack 済み）
    #[error("unknown delivery: {0}")]
    UnknownDelivery(DeliveryId),

    #[error("envelope codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result Store のエラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store に到達できない（一時的）
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Error returned by a task handler.
///
/// `kind` is preserved on the `FAILURE` record so callers can branch on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    pub kind: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<HandlerError> for TaskError {
    fn from(err: HandlerError) -> Self {
        TaskError::new(ErrorKind::from(err.kind), err.message)
    }
}
