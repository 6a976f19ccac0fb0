//! Pipeline module: per-request orchestration.
//!
//! A request moves through download, type checking, input normalization,
//! duration capping, the admission queue, the heavy step itself, size
//! fitting, and delivery. `Error` is reachable from any step; a missing
//! input ends the request as `NoMediaFound` rather than an error. The
//! request's scratch session closes on every exit path.
//!
//! Known gap: when a caller abandons a request mid-flight, codec
//! subprocesses already running are not terminated; the per-command timeout
//! is the only bound on runaways.

mod dispatcher;
mod types;

pub use dispatcher::Dispatcher;
pub use types::{Job, Produced, RequestOutcome, RequestSpec, WorkerProduced};
