//! Provisioning and teardown orchestrators
//!
//! `build` walks the graph in creation order after a one-shot resolution
//! phase; `destroy` walks the exact reverse with a bounded retry policy
//! around deletes that fail while the provider releases cross-references.

mod build;
mod resolve;
mod teardown;

pub use build::build;
pub use teardown::{destroy, NodeOutcome, Outcome, RetryPolicy, TeardownReport};
