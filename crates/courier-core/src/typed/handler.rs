//! Handler trait - Task を実行する Handler の定義
//!
//! - ジェネリック trait (`Handler<T>`): 表層、型安全
//! - Object-safe trait (`DynHandler`): 内部、registry に格納する
//! - `TypedHandler<T, H>` が両者をつなぐ（type erasure）

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::{Task, TaskSchema};
use crate::domain::{ErrorKind, HandlerError, TaskError};

/// Handler は Task を実行して `T::Output` を返す
///
/// Delivery is at-least-once: the same task may be handled twice if a worker
/// stalls past the visibility timeout. Handlers with side effects should be
/// idempotent.
///
/// # 使用例
/// ```ignore
/// struct AddHandler;
///
/// #[async_trait]
/// impl Handler<AddTask> for AddHandler {
///     async fn handle(&self, task: AddTask) -> Result<i64, HandlerError> {
///         Ok(task.x + task.y)
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<T::Output, HandlerError>;
}

/// Why a type-erased execution did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("payload does not match input schema")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("output could not be encoded")]
    Encode(#[source] serde_json::Error),
}

impl From<ExecError> for TaskError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Decode(e) => TaskError::new(ErrorKind::InvalidPayload, e.to_string()),
            ExecError::Handler(e) => e.into(),
            ExecError::Encode(e) => TaskError::new(ErrorKind::InvalidOutput, e.to_string()),
        }
    }
}

/// DynHandler は object-safe な Handler の抽象化
///
/// `HashMap<TaskType, Arc<dyn DynHandler>>` に格納できる。
#[async_trait]
pub trait DynHandler: Send + Sync {
    fn task_type(&self) -> &'static str;

    fn schema(&self) -> TaskSchema;

    /// Check `payload` against the input schema without running anything.
    fn validate(&self, payload: &serde_json::Value) -> Result<(), serde_json::Error>;

    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<serde_json::Value, ExecError>;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn task_type(&self) -> &'static str {
        T::TYPE
    }

    fn schema(&self) -> TaskSchema {
        TaskSchema::of::<T>()
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), serde_json::Error> {
        <T as serde::Deserialize<'_>>::deserialize(payload).map(|_| ())
    }

    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<serde_json::Value, ExecError> {
        let task: T = serde_json::from_value(payload).map_err(ExecError::Decode)?;
        let output = self.handler.handle(task).await?;
        serde_json::to_value(output).map_err(ExecError::Encode)
    }
}
