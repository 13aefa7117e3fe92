//! Async-task failure forwarding and runtime context

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::integration::Integration;
use crate::record::Record;

/// Attaches a bounded snapshot of the current tokio runtime to every
/// record emitted while a runtime is active, and forwards task failures
/// into the capture pipeline via [`TokioIntegration::monitor`].
pub struct TokioIntegration;

impl TokioIntegration {
    pub fn new() -> Self {
        Self
    }

    /// Await a spawned task and forward its failure, if any, into the
    /// currently active capture context. Yields the task's output, or
    /// `None` when the task panicked or was cancelled.
    ///
    /// A panicking task has already been captured by the installed
    /// panic hook at panic time; the join failure recorded here ties
    /// the panic to the task that died of it.
    pub async fn monitor<T>(handle: JoinHandle<T>) -> Option<T> {
        match handle.await {
            Ok(value) => Some(value),
            Err(err) => {
                let context = crate::hook::current();
                if err.is_panic() || err.is_cancelled() {
                    if let Err(sink_err) = context.from_error(&err) {
                        tracing::error!(error = %sink_err, "failed to write task failure report");
                    }
                } else if let Err(sink_err) =
                    context.log_metadata(json!({"msg": "task failed for an unknown reason"}))
                {
                    tracing::error!(error = %sink_err, "failed to write task failure report");
                }
                None
            }
        }
    }
}

impl Default for TokioIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl Integration for TokioIntegration {
    fn name(&self) -> &'static str {
        "tokio"
    }

    /// Snapshot the running runtime. Must stay non-blocking: this runs
    /// inside the emit path, possibly on a runtime worker thread.
    fn gather(&self, _record: &dyn Record) -> anyhow::Result<Option<Value>> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Ok(None);
        };

        let metrics = handle.metrics();
        Ok(Some(json!({
            "flavor": format!("{:?}", handle.runtime_flavor()),
            "workers": metrics.num_workers(),
            "alive_tasks": metrics.num_alive_tasks(),
        })))
    }

    fn session_data(&self) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}
