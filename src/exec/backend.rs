// src/exec/backend.rs

//! Pluggable invocation backend.
//!
//! Stages and workflow steps talk to an [`Invoker`] instead of spawning
//! processes directly, so tests can swap in a fake that records calls and
//! simulates success, failure, or a hung tool.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::ItemError;
use crate::exec::invocation::Invocation;
use crate::exec::process::run_process;
use crate::exec::timeout::{run_with_deadline, Guarded};

pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ItemError>> + Send + 'a>>;

/// Runs one invocation. Implementations must stop promptly (and clean up
/// any child process) once `cancel` fires.
pub trait Invoker: Send + Sync {
    fn invoke<'a>(&'a self, invocation: &'a Invocation, cancel: CancellationToken) -> InvokeFuture<'a>;
}

/// Production backend: spawns OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl Invoker for ProcessInvoker {
    fn invoke<'a>(&'a self, invocation: &'a Invocation, cancel: CancellationToken) -> InvokeFuture<'a> {
        Box::pin(run_process(invocation, cancel))
    }
}

/// Invoke under a deadline; expiry becomes [`ItemError::TimedOut`].
pub async fn invoke_with_deadline(
    invoker: &dyn Invoker,
    invocation: &Invocation,
    limit: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), ItemError> {
    match run_with_deadline(limit, cancel, |token| invoker.invoke(invocation, token)).await {
        Guarded::Completed(result) => result,
        Guarded::TimedOut(limit) => Err(ItemError::TimedOut(limit)),
    }
}
