//! Job scheduling for wheelwright releases.
//!
//! Fans the jobs of a release out to a bounded pool of workers and gates
//! the publish phase on every required job succeeding.

pub mod coordinator;
pub mod queue;
pub mod report;
pub mod worker;

pub use coordinator::{Destination, ReleaseCoordinator, ReleaseEvent, RunOptions};
pub use queue::JobQueue;
pub use report::{JobReport, RunOutcome, RunReport};
pub use worker::Worker;
