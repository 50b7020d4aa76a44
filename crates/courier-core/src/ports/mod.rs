//! Ports - 抽象化レイヤー
//!
//! 外部システム（message broker, KV store）へのインターフェース。
//! Dispatcher / WorkerLoop / StatusResolver はこれらを constructor で受け取る。

pub mod broker_queue;
pub mod clock;
pub mod id_generator;
pub mod result_store;

pub use self::broker_queue::{BrokerQueue, Delivery};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::result_store::ResultStore;
