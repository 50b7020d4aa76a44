//! TaskRegistry - Handler の登録と管理
//!
//! 起動時に一度だけ組み立て（mutable）、あとは `Arc<TaskRegistry>` として
//! Dispatcher（検証）と WorkerLoop（実行）から読むだけ。ロック不要。

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::{Task, TaskSchema};
use crate::domain::TaskType;

/// TaskRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TaskRegistry::new();
/// registry.register::<AddTask, _>(AddHandler)?;
///
/// let handler = registry.resolve(&TaskType::new("add"));
/// ```
#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<TaskType, Arc<dyn DynHandler>>,
}

/// RegistryError は TaskRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for task type '{0}' is already registered")]
    DuplicateTaskType(TaskType),
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `T::TYPE`; the schema comes from `T` and `T::Output`.
    pub fn register<T: Task, H: Handler<T> + 'static>(&mut self, handler: H) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    /// Register an already type-erased handler under its own task type.
    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let task_type = TaskType::new(handler.task_type());
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::DuplicateTaskType(task_type));
        }
        tracing::debug!(task_type = %task_type, "registered task handler");
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    pub fn resolve(&self, task_type: &TaskType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.handlers.contains_key(task_type)
    }

    pub fn schema(&self, task_type: &TaskType) -> Option<TaskSchema> {
        self.handlers.get(task_type).map(|h| h.schema())
    }

    /// Registered task types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().map(|t| t.to_string()).collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AddHandler, AddTask, FailingHandler, FailingTask};

    #[test]
    fn register_and_resolve() {
        let mut registry = TaskRegistry::new();
        registry.register::<AddTask, _>(AddHandler::default()).unwrap();

        let resolved = registry.resolve(&TaskType::new(AddTask::TYPE));
        assert!(resolved.is_some());
        assert!(registry.resolve(&TaskType::new("subtract")).is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register::<AddTask, _>(AddHandler::default()).unwrap();

        let result = registry.register::<AddTask, _>(AddHandler::default());
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateTaskType(t)) if t.as_str() == "add"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = TaskRegistry::new();
        registry.register::<FailingTask, _>(FailingHandler).unwrap();
        registry.register::<AddTask, _>(AddHandler::default()).unwrap();

        assert_eq!(
            registry.registered_types(),
            vec![AddTask::TYPE.to_string(), FailingTask::TYPE.to_string()]
        );
    }

    #[test]
    fn schema_exposes_input_and_output_types() {
        let mut registry = TaskRegistry::new();
        registry.register::<AddTask, _>(AddHandler::default()).unwrap();

        let schema = registry.schema(&TaskType::new("add")).unwrap();
        assert_eq!(schema.task_type, "add");
        assert!(schema.input.ends_with("AddTask"));
        assert_eq!(schema.output, "i64");
    }
}
