//! # bosc
//!
//! Host-based anomaly detection with the "bag of system calls" technique. A normal profile of
//! syscall pattern frequencies is learned from the head of an offline trace; the remaining
//! epochs are scored by cosine similarity against it and flagged when they drift too far.
//!
//! Data flow:
//!
//! ```text
//! trace -> epochs -> sliding-window patterns -> FrequencyDatabase
//!       -> similarity vs. normal profile -> Statistics -> Summary
//! ```
//!
//! A [`sweep::Sweep`] repeats this for every point of a grid of epoch sizes and thresholds.

pub mod classifier;
pub mod config;
pub mod database;
pub mod error;
pub mod pattern;
pub mod report;
pub mod stats;
pub mod sweep;
pub mod syscall;
pub mod trace;

pub use classifier::{ClassifierParams, EpochClassifier, Phase, StopSignal};
pub use database::FrequencyDatabase;
pub use error::{Error, Result};
pub use pattern::{Encoding, Pattern};
pub use stats::{Statistics, Summary};
pub use sweep::{ParameterGrid, Sweep, SweepConfig};
pub use syscall::{SyscallId, SyscallIndex};
