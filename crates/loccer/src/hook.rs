//! Process-wide hook installation and restoration

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::capture::CaptureContext;
use crate::dispatcher::Dispatcher;
use crate::integration::Integration;
use crate::integrations::platform::PlatformIntegration;
use crate::sinks::{Sink, StderrSink};
use crate::Result;

/// The single process-wide active capture context. Replaced together
/// with the runtime's panic hook under the write lock, never partially.
static ACTIVE: RwLock<CaptureContext> = RwLock::new(CaptureContext::Passthrough);

thread_local! {
    /// Set while capture machinery runs on this thread, so panics raised
    /// by guarded formatting or by the hook itself are never re-captured.
    static CAPTURE_SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

pub(crate) fn capture_suppressed() -> bool {
    CAPTURE_SUPPRESSED.with(Cell::get)
}

pub(crate) fn with_capture_suppressed<R>(f: impl FnOnce() -> R) -> R {
    CAPTURE_SUPPRESSED.with(|flag| {
        let previous = flag.replace(true);
        let result = f();
        flag.set(previous);
        result
    })
}

/// Configuration for [`install_with`].
///
/// Defaults match a plain [`install`] call: an stderr sink, the platform
/// integration, previous-hook chaining on and suppression off.
pub struct InstallOptions {
    sinks: Vec<Box<dyn Sink>>,
    integrations: Vec<Arc<dyn Integration>>,
    preserve_previous: bool,
    suppress: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            sinks: vec![Box::new(StderrSink::new())],
            integrations: vec![Arc::new(PlatformIntegration::new())],
            preserve_previous: true,
            suppress: false,
        }
    }
}

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sink list.
    pub fn sinks(mut self, sinks: Vec<Box<dyn Sink>>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Replace the integration list.
    pub fn integrations(mut self, integrations: Vec<Arc<dyn Integration>>) -> Self {
        self.integrations = integrations;
        self
    }

    /// Whether the previously installed hook keeps running after ours.
    /// Disabling this breaks the chain at this install.
    pub fn preserve_previous(mut self, preserve: bool) -> Self {
        self.preserve_previous = preserve;
        self
    }

    /// Whether scoped captures swallow the failure instead of letting it
    /// continue propagating.
    pub fn suppress(mut self, suppress: bool) -> Self {
        self.suppress = suppress;
        self
    }
}

/// Install a dispatcher with the default sink and integrations as the
/// process-wide panic hook.
pub fn install() -> Result<Arc<Dispatcher>> {
    install_with(InstallOptions::default())
}

/// Install a dispatcher as the process-wide panic hook.
///
/// The current hook is snapshotted as "previous" and invoked after ours
/// unless `preserve_previous` is off. Installing again replaces the
/// active dispatcher and rewires the chain; it does not uninstall first,
/// so nested installs compose in reverse-installation order.
pub fn install_with(options: InstallOptions) -> Result<Arc<Dispatcher>> {
    let dispatcher = Arc::new(Dispatcher::new(
        options.sinks,
        options.integrations,
        options.suppress,
    )?);

    let mut active = ACTIVE.write().unwrap_or_else(|err| err.into_inner());

    let previous = options.preserve_previous.then(panic::take_hook);

    let hook_dispatcher = Arc::clone(&dispatcher);
    panic::set_hook(Box::new(move |info| {
        if capture_suppressed() {
            return;
        }

        let outcome = with_capture_suppressed(|| {
            panic::catch_unwind(AssertUnwindSafe(|| hook_dispatcher.handle_panic(info)))
        });
        if outcome.is_err() {
            eprintln!("loccer: panic while handling a panic report, report dropped");
        }

        if let Some(previous) = &previous {
            previous(info);
        }
    }));

    *active = CaptureContext::Active(Arc::clone(&dispatcher));
    drop(active);

    tracing::debug!(
        session_id = %dispatcher.session().session_id(),
        "error capture hook installed"
    );
    Ok(dispatcher)
}

/// Reset the panic hook to the runtime's default and the active context
/// to a passthrough. This is a hard reset, not an undo of the last
/// install: the entire chain of previous hooks is discarded.
pub fn restore() {
    let mut active = ACTIVE.write().unwrap_or_else(|err| err.into_inner());
    drop(panic::take_hook());
    *active = CaptureContext::Passthrough;
    drop(active);

    tracing::debug!("error capture hook restored");
}

/// The guarded accessor for the process-wide capture context.
pub fn current() -> CaptureContext {
    ACTIVE.read().unwrap_or_else(|err| err.into_inner()).clone()
}
