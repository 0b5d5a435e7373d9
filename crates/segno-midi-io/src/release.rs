//! Scoped acquisition for multi-step opens.
//!
//! Open acquires native resources one at a time; a failure partway through
//! must release everything acquired so far, in reverse order, before the
//! error is surfaced. Close follows the same discipline: every release step
//! is attempted, the first failure is kept and later ones are logged.

use crate::error::{Error, Result};
use tracing::warn;

type Release = Box<dyn FnOnce() -> Result<()> + Send>;

/// Release closures for the resources acquired so far during one open.
pub(crate) struct ReleaseStack {
    steps: Vec<(&'static str, Release)>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Registers the release step for a resource that was just acquired.
    pub fn push<F>(&mut self, stage: &'static str, release: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.steps.push((stage, Box::new(release)));
    }

    /// Runs every release step, most recently acquired first.
    ///
    /// All steps run regardless of failures; the first failure is returned.
    pub fn unwind(mut self) -> Result<()> {
        let mut first: Option<Error> = None;
        while let Some((stage, release)) = self.steps.pop() {
            if let Err(err) = release() {
                record_failure(&mut first, stage, err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drops the release steps without running them.
    ///
    /// Called once the open has fully succeeded and release duty has moved
    /// to the handle.
    pub fn disarm(mut self) {
        self.steps.clear();
    }
}

/// Keeps the first release failure and logs the rest.
pub(crate) fn record_failure(first: &mut Option<Error>, stage: &'static str, err: Error) {
    if first.is_none() {
        *first = Some(err);
    } else {
        warn!(stage, error = %err, "additional release failure");
    }
}
