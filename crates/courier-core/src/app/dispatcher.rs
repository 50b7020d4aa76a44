//! Dispatcher - producer 側の入口
//!
//! # submit の順序
//! 1. task_type と payload を検証（ここまで副作用なし）
//! 2. handle を発行
//! 3. PENDING の TaskRecord を TTL 付きで書く
//! 4. envelope を enqueue
//!
//! 4 が失敗したら record を FAILURE / EnqueueFailed にしてから返す。
//! record は必ず envelope より先に存在する。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    ErrorKind, QueueError, StoreError, TaskEnvelope, TaskError, TaskHandle, TaskRecord, TaskType,
};
use crate::ports::{BrokerQueue, Clock, IdGenerator, ResultStore};
use crate::typed::{Task, TaskRegistry};

/// Extra knobs for [`Dispatcher::submit_with`].
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Handle of the failed task this submission retries.
    pub retry_of: Option<TaskHandle>,
}

/// DispatchError は submit のエラー
///
/// - client error（4xx 相当）: `UnknownTaskType`, `InvalidPayload`
/// - infrastructure error（5xx 相当）: `EnqueueFailed`, `Store`
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown task type '{0}'")]
    UnknownTaskType(TaskType),

    #[error("invalid payload for task type '{task_type}': {reason}")]
    InvalidPayload { task_type: TaskType, reason: String },

    #[error("enqueue failed for {handle}: {source}")]
    EnqueueFailed {
        handle: TaskHandle,
        #[source]
        source: QueueError,
    },

    #[error("result store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnknownTaskType(_) | Self::InvalidPayload { .. })
    }

    pub fn is_infrastructure(&self) -> bool {
        !self.is_client_error()
    }

    /// Handle already issued before the failure, if any.
    pub fn handle(&self) -> Option<TaskHandle> {
        match self {
            Self::EnqueueFailed { handle, .. } => Some(*handle),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
    queue: Arc<dyn BrokerQueue>,
    store: Arc<dyn ResultStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    result_ttl: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TaskRegistry>,
        queue: Arc<dyn BrokerQueue>,
        store: Arc<dyn ResultStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        result_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            store,
            ids,
            clock,
            result_ttl,
        }
    }

    pub fn result_ttl(&self) -> Duration {
        self.result_ttl
    }

    /// Submit `payload` for `task_type` and return its handle without waiting
    /// for execution.
    pub async fn submit(
        &self,
        task_type: impl Into<TaskType>,
        payload: serde_json::Value,
    ) -> Result<TaskHandle, DispatchError> {
        self.submit_with(task_type, payload, SubmitOptions::default()).await
    }

    /// Submit a typed task under `T::TYPE`.
    pub async fn submit_typed<T: Task>(&self, task: &T) -> Result<TaskHandle, DispatchError> {
        let payload = serde_json::to_value(task).map_err(|e| DispatchError::InvalidPayload {
            task_type: TaskType::new(T::TYPE),
            reason: e.to_string(),
        })?;
        self.submit(T::TYPE, payload).await
    }

    pub async fn submit_with(
        &self,
        task_type: impl Into<TaskType>,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Result<TaskHandle, DispatchError> {
        let task_type = task_type.into();

        // 検証: store にも queue にも触らない
        let handler = self
            .registry
            .resolve(&task_type)
            .ok_or_else(|| DispatchError::UnknownTaskType(task_type.clone()))?;
        handler
            .validate(&payload)
            .map_err(|e| DispatchError::InvalidPayload {
                task_type: task_type.clone(),
                reason: e.to_string(),
            })?;

        let handle = self.ids.generate_handle();
        let now = self.clock.now();

        let mut record = TaskRecord::pending(handle, task_type.clone(), now, self.result_ttl)
            .with_retry_of(options.retry_of);
        self.store.put(handle, &record, self.result_ttl).await?;

        let envelope =
            TaskEnvelope::new(handle, task_type.clone(), payload, now).with_retry_of(options.retry_of);
        if let Err(source) = self.queue.enqueue(envelope).await {
            tracing::warn!(%handle, %task_type, error = %source, "enqueue failed, marking record as failed");
            self.compensate(&mut record, &source).await;
            return Err(DispatchError::EnqueueFailed { handle, source });
        }

        tracing::info!(%handle, %task_type, retry_of = ?options.retry_of, "task submitted");
        Ok(handle)
    }

    // enqueue に失敗した record を FAILURE にする。ここでも store が落ちていたら
    // record は TTL まで PENDING のまま残る。
    async fn compensate(&self, record: &mut TaskRecord, cause: &QueueError) {
        let now = self.clock.now();
        let error = TaskError::new(ErrorKind::EnqueueFailed, cause.to_string());
        if let Err(e) = record.mark_failed(error, now) {
            tracing::error!(handle = %record.handle, error = %e, "cannot mark record as failed");
            return;
        }
        if let Err(e) = self
            .store
            .put(record.handle, record, record.remaining_ttl(now))
            .await
        {
            tracing::error!(
                handle = %record.handle,
                error = %e,
                "compensating write failed, record stays pending until it expires"
            );
        }
    }
}
