//! Contract for contextual-data providers

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::dispatcher::Dispatcher;
use crate::record::Record;
use crate::repr;

/// Preamble of the diagnostic string stored when an integration fails
/// while gathering; a broken integration can never suppress the primary
/// record.
pub const GATHER_FAILURE_PREAMBLE: &str =
    "CRITICAL: error while calling the integration to gather data:";

/// A pluggable provider of contextual data.
///
/// Integrations are registered into an ordered sequence at dispatcher
/// construction and looked up by their unique name, which is also the
/// key their data is stored under in every record.
pub trait Integration: Send + Sync {
    /// Unique name, used as the record key for gathered data.
    fn name(&self) -> &'static str;

    /// Called once at registration. Errors propagate to the caller: a
    /// misconfigured integration fails at install time, not silently at
    /// first error.
    fn activate(&self, _dispatcher: &Dispatcher) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per emitted record to gather per-event data.
    fn gather(&self, record: &dyn Record) -> anyhow::Result<Option<Value>>;

    /// Called at most once per dispatcher lifetime, lazily, to gather
    /// one-time session data.
    fn session_data(&self) -> anyhow::Result<Option<Value>>;
}

/// Invoke `gather` with fault isolation: an error return or a panic is
/// converted into a diagnostic string under the integration's key.
pub(crate) fn guarded_gather(integration: &dyn Integration, record: &dyn Record) -> Option<Value> {
    let outcome = crate::hook::with_capture_suppressed(|| {
        panic::catch_unwind(AssertUnwindSafe(|| integration.gather(record)))
    });

    match outcome {
        Ok(Ok(data)) => data,
        Ok(Err(err)) => Some(failure_diagnostic(integration.name(), &format!("{err:?}"))),
        Err(payload) => Some(failure_diagnostic(
            integration.name(),
            &format!("panic: {}", repr::panic_message(payload.as_ref())),
        )),
    }
}

/// Invoke `session_data` with the same fault isolation as event-time
/// gathering.
pub(crate) fn guarded_session_data(integration: &dyn Integration) -> Option<Value> {
    let outcome = crate::hook::with_capture_suppressed(|| {
        panic::catch_unwind(AssertUnwindSafe(|| integration.session_data()))
    });

    match outcome {
        Ok(Ok(data)) => data,
        Ok(Err(err)) => Some(failure_diagnostic(integration.name(), &format!("{err:?}"))),
        Err(payload) => Some(failure_diagnostic(
            integration.name(),
            &format!("panic: {}", repr::panic_message(payload.as_ref())),
        )),
    }
}

fn failure_diagnostic(name: &str, rendered: &str) -> Value {
    tracing::warn!(integration = name, "integration failed while gathering data");
    Value::String(format!("{GATHER_FAILURE_PREAMBLE}\n{rendered}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MetadataRecord;
    use anyhow::anyhow;

    struct Healthy;

    impl Integration for Healthy {
        fn name(&self) -> &'static str {
            "healthy"
        }

        fn gather(&self, _record: &dyn Record) -> anyhow::Result<Option<Value>> {
            Ok(Some(Value::String("ok".to_string())))
        }

        fn session_data(&self) -> anyhow::Result<Option<Value>> {
            Ok(None)
        }
    }

    struct Failing;

    impl Integration for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn gather(&self, _record: &dyn Record) -> anyhow::Result<Option<Value>> {
            Err(anyhow!("gather exploded"))
        }

        fn session_data(&self) -> anyhow::Result<Option<Value>> {
            Err(anyhow!("session exploded"))
        }
    }

    struct Panicking;

    impl Integration for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn gather(&self, _record: &dyn Record) -> anyhow::Result<Option<Value>> {
            panic!("gather panicked");
        }

        fn session_data(&self) -> anyhow::Result<Option<Value>> {
            panic!("session panicked");
        }
    }

    fn diagnostic_text(value: Option<Value>) -> String {
        match value {
            Some(Value::String(text)) => text,
            other => panic!("expected diagnostic string, got {other:?}"),
        }
    }

    #[test]
    fn test_guarded_gather_success() {
        let record = MetadataRecord::new("payload");
        let data = guarded_gather(&Healthy, &record);
        assert_eq!(data, Some(Value::String("ok".to_string())));
    }

    #[test]
    fn test_guarded_gather_error_becomes_diagnostic() {
        let record = MetadataRecord::new("payload");
        let text = diagnostic_text(guarded_gather(&Failing, &record));
        assert!(text.starts_with(GATHER_FAILURE_PREAMBLE));
        assert!(text.contains("gather exploded"));
    }

    #[test]
    fn test_guarded_gather_panic_becomes_diagnostic() {
        let record = MetadataRecord::new("payload");
        let text = diagnostic_text(guarded_gather(&Panicking, &record));
        assert!(text.starts_with(GATHER_FAILURE_PREAMBLE));
        assert!(text.contains("gather panicked"));
    }

    #[test]
    fn test_guarded_session_data_error_becomes_diagnostic() {
        let text = diagnostic_text(guarded_session_data(&Failing));
        assert!(text.starts_with(GATHER_FAILURE_PREAMBLE));
        assert!(text.contains("session exploded"));
    }

    #[test]
    fn test_guarded_session_data_none_passthrough() {
        assert_eq!(guarded_session_data(&Healthy), None);
    }
}
