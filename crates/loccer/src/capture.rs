//! Capture surface: explicit, scoped and wrapped calling conventions

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use crate::dispatcher::Dispatcher;
use crate::record::Record;
use crate::Result;

/// Handle to whatever capture target is currently active.
///
/// `Passthrough` observes scoped failures and lets them continue to the
/// runtime's own handling without emitting anything; `Active` funnels
/// everything into its dispatcher. Obtained through [`crate::current`],
/// never through an ambient singleton.
#[derive(Clone)]
pub enum CaptureContext {
    Passthrough,
    Active(Arc<Dispatcher>),
}

impl CaptureContext {
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureContext::Active(_))
    }

    pub fn dispatcher(&self) -> Option<&Arc<Dispatcher>> {
        match self {
            CaptureContext::Passthrough => None,
            CaptureContext::Active(dispatcher) => Some(dispatcher),
        }
    }

    fn suppresses(&self) -> bool {
        match self {
            CaptureContext::Passthrough => false,
            CaptureContext::Active(dispatcher) => dispatcher.suppress(),
        }
    }

    /// Explicit form: capture an error held as a value, for contexts
    /// where the failure arrives through a channel of its own (e.g. a
    /// framework's error callback) rather than by propagation.
    pub fn from_error<E: std::error::Error + ?Sized>(&self, err: &E) -> Result<()> {
        match self {
            CaptureContext::Passthrough => Ok(()),
            CaptureContext::Active(dispatcher) => dispatcher.handle_error(err),
        }
    }

    /// Emit a metadata record wrapping an arbitrary payload.
    pub fn log_metadata<T: Serialize>(&self, data: T) -> Result<()> {
        match self {
            CaptureContext::Passthrough => Ok(()),
            CaptureContext::Active(dispatcher) => dispatcher.log_metadata(data),
        }
    }

    /// Emit a prepared record directly; the boundary surface for
    /// framework adapters building their own records.
    pub fn emit(&self, record: &mut dyn Record) -> Result<()> {
        match self {
            CaptureContext::Passthrough => Ok(()),
            CaptureContext::Active(dispatcher) => dispatcher.emit(record),
        }
    }

    /// Scoped form for the error channel: run the closure, capture an
    /// `Err` outcome, then hand it back unchanged.
    ///
    /// Suppression on the Result channel is the caller's choice of entry
    /// point; use [`run_suppressed`](Self::run_suppressed) to swallow
    /// the failure instead.
    pub fn run<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce() -> std::result::Result<R, E>,
        E: std::error::Error,
    {
        match f() {
            Ok(value) => Ok(value),
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Scoped form that swallows a captured failure, yielding `None`.
    pub fn run_suppressed<F, R, E>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> std::result::Result<R, E>,
        E: std::error::Error,
    {
        match f() {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Scoped form for the panic channel. Capturing the panic itself is
    /// the installed hook's job (it fires before unwinding); this guard
    /// decides what happens to the unwind afterwards: a suppressing
    /// context swallows it and yields `None`, any other resumes it.
    pub fn protect<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                if self.suppresses() {
                    None
                } else {
                    panic::resume_unwind(payload)
                }
            }
        }
    }

    /// Decoration form: wrap a callable so every invocation runs under
    /// the scoped behavior of [`run`](Self::run).
    pub fn wrap<F, R, E>(&self, f: F) -> impl Fn() -> std::result::Result<R, E>
    where
        F: Fn() -> std::result::Result<R, E>,
        E: std::error::Error,
    {
        let context = self.clone();
        move || context.run(&f)
    }

    /// Report a captured failure; a sink failure here cannot surface
    /// through the scoped signature, so it goes to the log.
    fn report<E: std::error::Error + ?Sized>(&self, err: &E) {
        if let Err(sink_err) = self.from_error(err) {
            tracing::error!(error = %sink_err, "failed to write error report");
        }
    }
}
