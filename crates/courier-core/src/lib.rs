//! courier-core
//!
//! Task dispatch and result tracking on top of a broker queue and a result store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, record, errors）
//! - **ports**: 抽象化レイヤー（BrokerQueue, ResultStore, Clock, IdGenerator）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TaskRegistry）
//! - **impls**: in-memory 実装（InMemoryBrokerQueue, InMemoryResultStore）
//! - **app**: アプリケーションロジック（builder, dispatcher, worker_loop, status, gc_loop）
//! - **config** / **observability**: 設定と tracing の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

#[cfg(test)]
mod testing;

pub use crate::app::{App, AppBuilder, DispatchError, Dispatcher, StatusResolver, WorkerLoop};
pub use crate::config::CourierConfig;
pub use crate::domain::{TaskHandle, TaskRecord, TaskState};
