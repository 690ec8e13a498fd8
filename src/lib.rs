//! Aquactl control library.
//!
//! Automates water changes on a tank whose fill level is inferred from
//! discrete level sensors. Pump actuation is driven by a per-step state
//! machine, bounded by an adaptive runtime estimator, guarded by
//! error-sensor interlocks, and sequenced by a priority scheduler.
//! All hardware I/O flows through the port traits in [`ports`], so the
//! whole control core runs unmodified against the in-memory simulator.

#![deny(unused_must_use)]

pub mod config;
pub mod controller;
pub mod estimator;
pub mod executor;
pub mod inbox;
pub mod interlock;
pub mod ports;
pub mod routine;
pub mod scheduler;
pub mod snapshot;
pub mod step;
pub mod tank;

mod error;

pub mod adapters;

pub use error::{CommandError, ConfigError, FailureKind};
