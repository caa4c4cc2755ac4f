// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`invocation`]: the program + argument contract.
//! - [`process`]: real execution with `tokio::process::Command`.
//! - [`backend`]: the [`Invoker`] trait, the production
//!   [`ProcessInvoker`], and deadline-aware invocation.
//! - [`timeout`]: the deadline / cancellation guard.

pub mod backend;
pub mod invocation;
pub mod process;
pub mod timeout;

pub use backend::{invoke_with_deadline, InvokeFuture, Invoker, ProcessInvoker};
pub use invocation::Invocation;
pub use timeout::{run_with_deadline, Guarded, KILL_GRACE};
