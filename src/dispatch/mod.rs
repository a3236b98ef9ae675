//! Request dispatch: queueing, bounded concurrency, deadlines, cancellation
//! and result delivery on top of a [`ModelSession`](crate::core::inference::ModelSession).

mod dispatcher;
mod handle;
mod queue;
mod request;
mod result;

pub use dispatcher::{DispatchStats, Dispatcher, ShutdownMode};
pub use handle::InferenceHandle;
pub use request::{CorrelationId, InferenceRequest, Priority};
pub use result::{CancelOutcome, InferenceOutput, InferenceResult};
