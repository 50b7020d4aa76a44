//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 方針
//! - Handler の登録は起動時に一度だけ。build 後の TaskRegistry は読み取り専用
//! - 起動時検証（Fail-fast）: expect_tasks の不足と不正な設定は build で弾く
//! - Broker Queue / Result Store は build に渡す（グローバルなシングルトンは持たない）

use std::sync::Arc;

use super::dispatcher::Dispatcher;
use super::gc_loop::GcLoop;
use super::status::StatusResolver;
use super::worker_group::WorkerGroup;
use super::worker_loop::WorkerLoop;
use crate::config::{ConfigError, CourierConfig};
use crate::ports::{BrokerQueue, Clock, IdGenerator, ResultStore, SystemClock, UlidGenerator};
use crate::typed::{Handler, RegistryError, Task, TaskRegistry};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .register::<AddTask, _>(AddHandler)?
///     .expect_tasks(&["add"])
///     .config(config)
///     .build(queue, store)?;
///
/// let handle = app.dispatcher().submit("add", json!({ "x": 5, "y": 7 })).await?;
/// ```
pub struct AppBuilder {
    registry: TaskRegistry,
    expected_tasks: Option<Vec<String>>,
    config: CourierConfig,
    clock: Arc<dyn Clock>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: TaskRegistry::new(),
            expected_tasks: None,
            config: CourierConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Handler を登録
    pub fn register<T: Task, H: Handler<T> + 'static>(mut self, handler: H) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// 期待される task_type のリストを設定
    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for record timestamps and handle generation.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate and wire everything around the given queue and store.
    ///
    /// # 検証
    /// - expect_tasks() で設定された task_type が全て登録されているか
    /// - 設定値が妥当か（CourierConfig::validate）
    pub fn build(
        self,
        queue: Arc<dyn BrokerQueue>,
        store: Arc<dyn ResultStore>,
    ) -> Result<App, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered_types = self.registry.registered_types();
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|t| !registered_types.contains(t))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }
        self.config.validate()?;

        tracing::info!(task_types = ?self.registry.registered_types(), "app built");
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(self.clock.clone()));
        Ok(App {
            registry: Arc::new(self.registry),
            queue,
            store,
            ids,
            clock: self.clock,
            config: self.config,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は組み立て済みのコンポーネント一式
///
/// Dispatcher / StatusResolver / WorkerLoop は同じ queue と store を共有する。
pub struct App {
    registry: Arc<TaskRegistry>,
    queue: Arc<dyn BrokerQueue>,
    store: Arc<dyn ResultStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    config: CourierConfig,
}

impl App {
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.registry.clone(),
            self.queue.clone(),
            self.store.clone(),
            self.ids.clone(),
            self.clock.clone(),
            self.config.result_ttl(),
        )
    }

    pub fn status(&self) -> StatusResolver {
        StatusResolver::new(self.store.clone())
    }

    pub fn worker(&self, id: usize) -> WorkerLoop {
        WorkerLoop::new(
            id,
            self.registry.clone(),
            self.queue.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.config.worker_settings(),
        )
    }

    /// Spawn `n` workers on the current runtime.
    pub fn spawn_workers(&self, n: usize) -> WorkerGroup {
        tracing::info!(workers = n, "spawning workers");
        WorkerGroup::spawn((0..n).map(|id| self.worker(id)))
    }

    pub fn gc_loop(&self) -> GcLoop {
        GcLoop::new(self.store.clone(), self.config.gc_interval())
    }
}
