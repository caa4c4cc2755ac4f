use std::fs;
use std::sync::Mutex;

use scanflow::errors::ItemError;
use scanflow::exec::{Invocation, InvokeFuture, Invoker};
use tokio_util::sync::CancellationToken;

/// What the fake does for a matching invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Write every produced file and exit 0.
    Succeed,
    /// Exit with the given non-zero code, writing nothing.
    Fail(i32),
    /// Never finish on its own; only cancellation ends it.
    Hang,
    /// Exit 0 without writing the produced files.
    ForgetOutputs,
}

/// An [`Invoker`] that:
/// - records every invocation it receives
/// - writes the declared outputs (content unique per call) instead of
///   running anything
/// - can be told to fail / hang for invocations mentioning a given string
///   (an item ID, a program name, ...).
#[derive(Debug, Default)]
pub struct FakeInvoker {
    calls: Mutex<Vec<Invocation>>,
    rules: Mutex<Vec<(String, Behaviour)>>,
}

impl FakeInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `behaviour` to every invocation whose program or arguments
    /// contain `needle`. The first matching rule wins.
    pub fn when(self, needle: &str, behaviour: Behaviour) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), behaviour));
        self
    }

    /// Drop all rules; everything succeeds from now on.
    pub fn reset_rules(&self) {
        self.rules.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of recorded invocations mentioning `needle`.
    pub fn calls_mentioning(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| mentions(inv, needle))
            .count()
    }

    fn behaviour_for(&self, invocation: &Invocation) -> Behaviour {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| mentions(invocation, needle))
            .map(|(_, b)| *b)
            .unwrap_or(Behaviour::Succeed)
    }
}

fn mentions(invocation: &Invocation, needle: &str) -> bool {
    invocation.program.to_string_lossy().contains(needle)
        || invocation.args.iter().any(|a| a.contains(needle))
}

impl Invoker for FakeInvoker {
    fn invoke<'a>(&'a self, invocation: &'a Invocation, cancel: CancellationToken) -> InvokeFuture<'a> {
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.clone());
            calls.len()
        };
        let behaviour = self.behaviour_for(invocation);

        Box::pin(async move {
            match behaviour {
                Behaviour::Succeed => {
                    for out in &invocation.produces {
                        if let Some(parent) = out.parent() {
                            fs::create_dir_all(parent).map_err(|e| ItemError::io(parent, e))?;
                        }
                        // Distinct per call so downstream fingerprints move.
                        let body = format!("produced by {} (call {call_no})\n", invocation.program.display());
                        fs::write(out, body).map_err(|e| ItemError::io(out, e))?;
                    }
                    Ok(())
                }
                Behaviour::Fail(code) => Err(ItemError::ExitStatus {
                    program: invocation.program.clone(),
                    code,
                }),
                Behaviour::Hang => {
                    cancel.cancelled().await;
                    Err(ItemError::Cancelled)
                }
                Behaviour::ForgetOutputs => Ok(()),
            }
        })
    }
}
