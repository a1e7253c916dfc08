//! Agent runtime: bootstrap, periodic scheduler with jitter, refresh signal,
//! one-shot deadline, tracing setup.

mod bootstrap;
mod error;
mod runtime;

pub use bootstrap::{bootstrap, Agent};
pub use error::DaemonError;
pub use runtime::{
    init_tracing, jittered, run, run_once, run_with, start_blocking, with_deadline, RunOptions,
    JITTER_RANGE,
};
