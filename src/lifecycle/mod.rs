//! Startup gating on asynchronous initialization.
//!
//! Tasks are registered under a named barrier and start running right
//! away. Running the barrier waits for every task registered under it so
//! far. The default barrier is [`START_BARRIER`], which the vault uses to
//! hold application start until hydration has finished.

mod coordinator;

pub use coordinator::{LifecycleCoordinator, START_BARRIER};
