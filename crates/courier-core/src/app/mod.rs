//! App - アプリケーション層
//!
//! ports を組み合わせて submit / 実行 / 参照の流れを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: 構築とワイヤリング、起動時検証
//! - **Dispatcher**: 検証 → PENDING record → enqueue
//! - **WorkerLoop**: dequeue → RUNNING → handler → SUCCESS/FAILURE → ack
//! - **WorkerGroup**: 複数の WorkerLoop と共通の shutdown 信号
//! - **StatusResolver**: handle からの読み取り
//! - **GcLoop**: 期限切れ record の回収

pub mod backoff;
pub mod builder;
pub mod dispatcher;
pub mod gc_loop;
pub mod status;
pub mod worker_group;
pub mod worker_loop;

pub use self::backoff::Backoff;
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::dispatcher::{DispatchError, Dispatcher, SubmitOptions};
pub use self::gc_loop::GcLoop;
pub use self::status::{StatusResolver, WaitError};
pub use self::worker_group::WorkerGroup;
pub use self::worker_loop::{ProcessOutcome, WorkerLoop, WorkerSettings};
