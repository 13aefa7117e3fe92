//! Best-effort textual representation of arbitrary values

use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde_json::Value;

/// Placeholder stored when a value has no usable representation at all.
pub(crate) const REPR_FALLBACK: &str = "CRITICAL ERROR: could not get repr of the object";

/// Render a value's `Debug` representation without letting a panicking
/// `Debug` impl escape the capture boundary.
///
/// A panic raised while formatting is converted into a fixed diagnostic
/// string carrying the panic message.
pub fn best_effort_repr<T: Debug + ?Sized>(value: &T) -> String {
    let outcome = crate::hook::with_capture_suppressed(|| {
        panic::catch_unwind(AssertUnwindSafe(|| format!("{value:?}")))
    });

    match outcome {
        Ok(repr) => repr,
        Err(payload) => {
            let desc = panic_message(payload.as_ref());
            format!("Error getting repr of the object: `{desc}`")
        }
    }
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Coerce any serializable payload into a JSON value, degrading to the
/// fixed placeholder instead of failing.
pub(crate) fn to_json_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(REPR_FALLBACK.to_string()))
}
