//! Compensation: ordered writes with best-effort undo.
//!
//! Every operation that writes an entity and then indexes it runs through
//! this helper. A failed write undoes the writes that already succeeded, in
//! reverse order, exactly once. Undo failures are logged and never replace
//! the error of the write that failed.

use tracing::{error, warn};

use crate::error::RegistryResult;

type Undo<'a> = Box<dyn FnOnce() -> RegistryResult<()> + 'a>;

/// Undo log for one logical operation.
#[must_use = "call commit() or finish() once every write has succeeded"]
pub struct Compensation<'a> {
    operation: &'static str,
    subject: String,
    undo: Vec<(&'static str, Undo<'a>)>,
}

impl<'a> Compensation<'a> {
    pub fn begin(operation: &'static str, subject: impl Into<String>) -> Self {
        Self {
            operation,
            subject: subject.into(),
            undo: Vec::new(),
        }
    }

    /// Run a write. On success its undo is recorded; on failure every
    /// recorded undo runs and the write's error is returned.
    pub fn step<T, W, U>(&mut self, label: &'static str, write: W, undo: U) -> RegistryResult<T>
    where
        W: FnOnce() -> RegistryResult<T>,
        U: FnOnce() -> RegistryResult<()> + 'a,
    {
        match write() {
            Ok(value) => {
                self.undo.push((label, Box::new(undo)));
                Ok(value)
            }
            Err(err) => {
                warn!(
                    operation = self.operation,
                    subject = %self.subject,
                    step = label,
                    error = %err,
                    "write failed, compensating"
                );
                self.rollback();
                Err(err)
            }
        }
    }

    /// Run the last write of the operation; no undo is recorded for it.
    pub fn finish<T, W>(mut self, label: &'static str, write: W) -> RegistryResult<T>
    where
        W: FnOnce() -> RegistryResult<T>,
    {
        self.step(label, write, || Ok(()))
    }

    /// Keep every write. The undo log is dropped.
    pub fn commit(self) {}

    fn rollback(&mut self) {
        while let Some((label, undo)) = self.undo.pop() {
            match undo() {
                Ok(()) => warn!(
                    operation = self.operation,
                    subject = %self.subject,
                    step = label,
                    "rolled back"
                ),
                Err(err) => error!(
                    operation = self.operation,
                    subject = %self.subject,
                    step = label,
                    error = %err,
                    "rollback failed, manual repair may be needed"
                ),
            }
        }
    }
}

/// Two-write shorthand: `primary`, then `secondary`; if `secondary` fails,
/// `undo_primary` runs and `secondary`'s error is returned.
pub fn dual_write<'a, P, U, S>(
    operation: &'static str,
    subject: &str,
    primary: P,
    undo_primary: U,
    secondary: S,
) -> RegistryResult<()>
where
    P: FnOnce() -> RegistryResult<()>,
    U: FnOnce() -> RegistryResult<()> + 'a,
    S: FnOnce() -> RegistryResult<()>,
{
    let mut saga = Compensation::begin(operation, subject);
    saga.step("primary", primary, undo_primary)?;
    saga.finish("secondary", secondary)
}
