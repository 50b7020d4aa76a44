//! Domain model (handles, envelopes, records, errors).

pub mod errors;
pub mod ids;
pub mod record;
pub mod task;

pub use errors::{HandlerError, QueueError, StoreError};
pub use ids::{DeliveryId, ParseIdError, TaskHandle};
pub use record::{ErrorKind, TaskError, TaskRecord, TaskState, TransitionError};
pub use task::{TaskEnvelope, TaskType};
