// src/workflow/mod.rs

//! Per-item workflows: named steps with declared inputs and outputs,
//! skipped while their inputs are unchanged and their outputs exist.

pub mod cache;
pub mod graph;
pub mod items;
pub mod step;
pub mod template;

pub use cache::{CachedInput, WorkflowCache};
pub use graph::{StaleReason, StepState, WorkflowGraph, WorkflowReport};
pub use items::discover_items;
pub use step::StepDefinition;
