//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryBrokerQueue**: visibility timeout 付きの配送キュー
//! - **InMemoryResultStore**: TTL 付きの Result Store
//!
//! 本番の broker / KV store 向けの実装は別クレートに置く想定。

pub mod inmem_broker;
pub mod inmem_store;

pub use self::inmem_broker::{BrokerStats, DEFAULT_VISIBILITY_TIMEOUT, InMemoryBrokerQueue};
pub use self::inmem_store::InMemoryResultStore;
