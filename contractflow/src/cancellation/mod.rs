//! Cooperative cancellation for workflow runs.

mod token;

pub use token::{CancelCallback, CancellationToken};
