//! Core orchestrator: gather from integrations, fan out to sinks

use std::sync::Arc;

use serde::Serialize;

use crate::integration::{self, Integration};
use crate::record::{ExceptionRecord, MetadataRecord, Record, Session};
use crate::sinks::Sink;
use crate::{Error, Result};

/// Owns the active set of integrations and sinks, and one session.
///
/// The dispatcher implements the emit algorithm: gather from every
/// integration with per-integration fault isolation, attach the data to
/// the record, and fan out to every sink, injecting the session record
/// exactly once per session lifetime.
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
    integrations: Vec<Arc<dyn Integration>>,
    session: Session,
    suppress: bool,
}

impl Dispatcher {
    /// Construct a dispatcher with a fresh session and activate every
    /// integration in registration order. The first activation error
    /// aborts construction.
    pub fn new(
        sinks: Vec<Box<dyn Sink>>,
        integrations: Vec<Arc<dyn Integration>>,
        suppress: bool,
    ) -> Result<Self> {
        let dispatcher = Self {
            sinks,
            integrations,
            session: Session::new(),
            suppress,
        };

        for item in &dispatcher.integrations {
            item.activate(&dispatcher).map_err(|source| Error::Activation {
                name: item.name().to_string(),
                source,
            })?;
        }

        Ok(dispatcher)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn integrations(&self) -> &[Arc<dyn Integration>] {
        &self.integrations
    }

    /// Whether scoped captures on this dispatcher swallow the failure
    /// instead of letting it continue propagating.
    pub fn suppress(&self) -> bool {
        self.suppress
    }

    /// Gather integration data into the record, then write it to every
    /// sink in registration order.
    ///
    /// When this is the session's first emission with at least one sink
    /// configured, the session record is written to each sink before
    /// that sink receives the triggering record. Sink errors are not
    /// caught here; the first failure propagates and stalls the fan-out.
    pub fn emit(&self, record: &mut dyn Record) -> Result<()> {
        for item in &self.integrations {
            if let Some(data) = integration::guarded_gather(item.as_ref(), &*record) {
                record
                    .integration_data_mut()
                    .insert(item.name().to_string(), data);
            }
        }

        if self.sinks.is_empty() {
            return Ok(());
        }

        let first_capture = !self.session.mark_captured();
        if first_capture {
            self.session.resolve_data(&self.integrations);
        }

        for sink in &self.sinks {
            if first_capture {
                sink.output(&self.session, self)?;
            }
            sink.output(&*record, self)?;
        }

        Ok(())
    }

    /// Wrap a payload in a metadata record and emit it.
    pub fn log_metadata<T: Serialize>(&self, data: T) -> Result<()> {
        let mut record = MetadataRecord::new(data);
        self.emit(&mut record)
    }

    /// Capture an error value held by the caller.
    pub fn handle_error<E: std::error::Error + ?Sized>(&self, err: &E) -> Result<()> {
        let mut record = ExceptionRecord::from_error(err);
        self.emit(&mut record)
    }

    /// Capture a panic from inside the global hook. There is no caller
    /// to propagate sink failures to here, so they are reported on
    /// stderr; the process is already panicking.
    pub(crate) fn handle_panic(&self, info: &std::panic::PanicHookInfo<'_>) {
        let backtrace = backtrace::Backtrace::new();
        let mut record = ExceptionRecord::from_panic(info, &backtrace);
        if let Err(err) = self.emit(&mut record) {
            eprintln!("loccer: failed to write panic report: {err}");
        }
    }
}
