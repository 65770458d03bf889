//! tileflow
//!
//! A single-threaded, priority-preemptive cooperative task scheduler for
//! long-lived, step-wise background work: incremental tile decoding, deferred
//! geometry processing, periodic redraw work. Tasks declare `init`/`step`/
//! `on_done` hooks, a positive priority (smaller = more urgent) and a
//! per-turn batch size; the scheduler interleaves them deterministically,
//! preempting at step boundaries and preserving partially-completed state
//! across suspensions.
//!
//! # Example
//!
//! ```rust
//! use tileflow::{Scheduler, TaskBuilder};
//!
//! let scheduler = Scheduler::get_instance(4);
//! let spec = TaskBuilder::new("warmup")
//!     .priority(2)
//!     .batch(8)
//!     .init(|| 0u32)
//!     .step(|count| {
//!         *count += 1;
//!         *count < 100
//!     })
//!     .on_done(|count| assert_eq!(count, 100))
//!     .into_spec()
//!     .unwrap();
//! let task = scheduler.create(spec).unwrap();
//! task.start();
//! scheduler.run_until_idle();
//! ```

#![warn(rust_2018_idioms)]

pub mod error;
pub mod logging;
pub mod scheduler;
pub mod tile;

// Re-exports
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{
    Scheduler, SchedulerConfig, Steppable, TaskBuilder, TaskHandle, TaskId, TaskSpec, TaskState,
    Turn,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
