// src/stage/mod.rs

//! Stages: what to run for a stale work item, and how a batch of them is
//! processed.
//!
//! - `kinds.rs`: the closed set of gear variants and their file tables.
//! - `gear.rs`: the [`Gear`] trait and the parameterised [`StageGear`].
//! - `executor.rs`: [`StageExecutor`], the bounded worker pool.
//! - `log.rs`: failure log and run log, eager or opened on first write.

pub mod executor;
pub mod gear;
pub mod kinds;
pub mod log;

pub use executor::{perform_actions, StageExecutor, StageReport};
pub use gear::{Action, ArgumentSet, Gear, StageGear};
pub use kinds::{FileRole, GearKind, Passing};
pub use log::{BatchLog, DeferredLog};
