//! Record model: the structured units handed to sinks

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::integration::{self, Integration};
use crate::repr;

/// Discriminator for the three record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Session,
    Exception,
    MetadataLog,
}

impl RecordKind {
    /// The `loccer_type` value used in the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Session => "session",
            RecordKind::Exception => "exception",
            RecordKind::MetadataLog => "metadata_log",
        }
    }
}

/// One structured unit of captured information.
///
/// Every record carries a creation timestamp and a mapping from
/// integration name to that integration's gathered data; the mapping is
/// populated incrementally by the dispatcher and entries are never
/// removed. `as_json` must return a self-contained tree tagged with the
/// record's own kind discriminator.
pub trait Record: Send {
    fn kind(&self) -> RecordKind;

    /// UTC creation time, captured at construction.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Data gathered by integrations, keyed by integration name.
    fn integration_data(&self) -> &Map<String, Value>;

    fn integration_data_mut(&mut self) -> &mut Map<String, Value>;

    /// Serialize into the self-describing JSON form.
    fn as_json(&self) -> Value;
}

/// A single stack frame of a captured failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub filename: String,
    pub lineno: Option<u32>,
    /// Enclosing scope (resolved symbol or thread name).
    pub name: String,
    /// Source line text, read best-effort from disk.
    pub line: Option<String>,
    /// Named values attached by the embedder; `None` when nothing was
    /// attached. Runtime reflection of locals does not exist in Rust.
    pub locals: Option<BTreeMap<String, String>>,
}

impl Frame {
    pub fn new(filename: impl Into<String>, lineno: Option<u32>, name: impl Into<String>) -> Self {
        let filename = filename.into();
        let line = source_line(Some(Path::new(&filename)), lineno);
        Self {
            filename,
            lineno,
            name: name.into(),
            line,
            locals: None,
        }
    }

    /// Attach named context values. Each value is rendered through the
    /// guarded repr path, so a panicking `Debug` impl cannot break
    /// capture.
    pub fn with_locals<I, K, V>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Debug,
    {
        let rendered = locals
            .into_iter()
            .map(|(name, value)| (name.into(), repr::best_effort_repr(&value)))
            .collect();
        self.locals = Some(rendered);
        self
    }
}

/// Captured failure: type name, message, stack frames and optional
/// global bindings. Immutable after construction except for
/// integration-data accumulation.
pub struct ExceptionRecord {
    ts: DateTime<Utc>,
    pub exc_type: String,
    pub msg: String,
    pub frames: Vec<Frame>,
    pub globals: Option<Map<String, Value>>,
    integration_data: Map<String, Value>,
}

impl ExceptionRecord {
    pub fn new(exc_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            exc_type: exc_type.into(),
            msg: msg.into(),
            frames: Vec::new(),
            globals: None,
            integration_data: Map::new(),
        }
    }

    /// Build a record from an error value, capturing the call stack at
    /// the point of capture. The `source()` chain is appended to the
    /// message as `caused by:` lines.
    ///
    /// The type name is the error's unqualified type name when the
    /// concrete type is known; through a `&dyn Error` it degrades to
    /// `"Error"`.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let mut msg = err.to_string();
        let mut cause = err.source();
        while let Some(source) = cause {
            msg.push_str(&format!("\ncaused by: {source}"));
            cause = source.source();
        }

        let mut record = Self::new(short_type_name::<E>(), msg);
        record.frames = capture_frames();
        record
    }

    /// Build a record inside the panic hook. The panic location is
    /// always the first frame.
    pub fn from_panic(info: &std::panic::PanicHookInfo<'_>, backtrace: &backtrace::Backtrace) -> Self {
        let msg = repr::panic_message(info.payload());
        let mut record = Self::new("panic", msg);

        if let Some(location) = info.location() {
            let thread = std::thread::current();
            let name = thread.name().unwrap_or("<unnamed>").to_string();
            record
                .frames
                .push(Frame::new(location.file(), Some(location.line()), name));
        }

        record.frames.extend(frames_from_backtrace(backtrace));
        record
    }

    /// Attach a snapshot of process-global bindings, rendered through
    /// the guarded repr path.
    pub fn with_globals<I, K, V>(mut self, globals: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Debug,
    {
        let rendered = globals
            .into_iter()
            .map(|(name, value)| (name.into(), Value::String(repr::best_effort_repr(&value))))
            .collect();
        self.globals = Some(rendered);
        self
    }
}

impl Record for ExceptionRecord {
    fn kind(&self) -> RecordKind {
        RecordKind::Exception
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.ts
    }

    fn integration_data(&self) -> &Map<String, Value> {
        &self.integration_data
    }

    fn integration_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.integration_data
    }

    fn as_json(&self) -> Value {
        let mut data = json!({
            "loccer_type": self.kind().as_str(),
            "timestamp": self.ts.to_rfc3339(),
            "exc_type": self.exc_type,
            "msg": self.msg,
            "integrations": Value::Object(self.integration_data.clone()),
            "frames": self.frames,
        });

        if let (Value::Object(map), Some(globals)) = (&mut data, &self.globals) {
            map.insert("globals".to_string(), Value::Object(globals.clone()));
        }

        data
    }
}

/// Arbitrary serializable payload logged by application code.
pub struct MetadataRecord {
    ts: DateTime<Utc>,
    pub data: Value,
    integration_data: Map<String, Value>,
}

impl MetadataRecord {
    pub fn new<T: Serialize>(data: T) -> Self {
        Self {
            ts: Utc::now(),
            data: repr::to_json_value(&data),
            integration_data: Map::new(),
        }
    }
}

impl Record for MetadataRecord {
    fn kind(&self) -> RecordKind {
        RecordKind::MetadataLog
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.ts
    }

    fn integration_data(&self) -> &Map<String, Value> {
        &self.integration_data
    }

    fn integration_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.integration_data
    }

    fn as_json(&self) -> Value {
        json!({
            "loccer_type": self.kind().as_str(),
            "data": self.data,
            "integrations": Value::Object(self.integration_data.clone()),
        })
    }
}

/// One logical process run, owned by exactly one dispatcher.
///
/// Carries a freshly generated id, the permanently-latching `captured`
/// flag, and the lazily-computed per-integration session data.
pub struct Session {
    ts: DateTime<Utc>,
    session_id: String,
    captured: AtomicBool,
    data: OnceLock<Map<String, Value>>,
    integration_data: Map<String, Value>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            ts: Utc::now(),
            session_id: Uuid::new_v4().to_string(),
            captured: AtomicBool::new(false),
            data: OnceLock::new(),
            integration_data: Map::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether this session record has already been emitted to sinks.
    pub fn captured(&self) -> bool {
        self.captured.load(Ordering::SeqCst)
    }

    /// Latch the captured flag. Returns the previous value, so exactly
    /// one caller observes the first capture even under concurrency.
    pub(crate) fn mark_captured(&self) -> bool {
        self.captured.swap(true, Ordering::SeqCst)
    }

    /// Resolve the one-time session data, computing it on first access
    /// with the same fault isolation as event-time gathering.
    pub(crate) fn resolve_data(&self, integrations: &[Arc<dyn Integration>]) -> &Map<String, Value> {
        self.data.get_or_init(|| {
            let mut data = Map::new();
            for item in integrations {
                if let Some(value) = integration::guarded_session_data(item.as_ref()) {
                    data.insert(item.name().to_string(), value);
                }
            }
            data
        })
    }
}

impl Record for Session {
    fn kind(&self) -> RecordKind {
        RecordKind::Session
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.ts
    }

    fn integration_data(&self) -> &Map<String, Value> {
        &self.integration_data
    }

    fn integration_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.integration_data
    }

    fn as_json(&self) -> Value {
        let data = self.data.get().cloned().unwrap_or_default();
        json!({
            "loccer_type": self.kind().as_str(),
            "session_id": self.session_id,
            "data": Value::Object(data),
        })
    }
}

/// Symbol prefixes of capture machinery, stripped from recorded stacks.
const INTERNAL_FRAME_PREFIXES: &[&str] = &[
    "backtrace::",
    "loccer::record::capture_frames",
    "loccer::record::frames_from_backtrace",
    "loccer::record::ExceptionRecord",
    "loccer::capture::",
    "loccer::dispatcher::",
    "loccer::hook::",
    "std::panicking::",
    "core::panicking::",
    "std::panic::",
    "std::sys::",
    "std::rt::",
    "std::backtrace",
    "rust_begin_unwind",
    "__rust",
];

fn is_internal_frame(name: &str) -> bool {
    INTERNAL_FRAME_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Capture and resolve the current call stack.
pub(crate) fn capture_frames() -> Vec<Frame> {
    frames_from_backtrace(&backtrace::Backtrace::new())
}

pub(crate) fn frames_from_backtrace(backtrace: &backtrace::Backtrace) -> Vec<Frame> {
    let mut frames = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            let name = symbol
                .name()
                .map(|name| name.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());

            if is_internal_frame(&name) {
                continue;
            }

            let filename = symbol
                .filename()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            let lineno = symbol.lineno();
            let line = source_line(symbol.filename(), lineno);

            frames.push(Frame {
                filename,
                lineno,
                name,
                line,
                locals: None,
            });
        }
    }

    frames
}

fn source_line(path: Option<&Path>, lineno: Option<u32>) -> Option<String> {
    let path = path?;
    let lineno = lineno? as usize;
    if lineno == 0 {
        return None;
    }

    let file = std::fs::File::open(path).ok()?;
    let line = BufReader::new(file).lines().nth(lineno - 1)?.ok()?;
    Some(line.trim().to_string())
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct BoomError(String);

    impl fmt::Display for BoomError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for BoomError {}

    struct ReprFail;

    impl fmt::Debug for ReprFail {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("no repr here");
        }
    }

    #[test]
    fn test_exception_record_from_error() {
        let err = BoomError("boom".to_string());
        let record = ExceptionRecord::from_error(&err);

        assert_eq!(record.exc_type, "BoomError");
        assert_eq!(record.msg, "boom");
        assert!(!record.frames.is_empty());
    }

    #[derive(Debug)]
    struct WrappingError {
        source: BoomError,
    }

    impl fmt::Display for WrappingError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer failure")
        }
    }

    impl std::error::Error for WrappingError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.source)
        }
    }

    #[test]
    fn test_from_error_appends_cause_chain() {
        let err = WrappingError {
            source: BoomError("inner failure".to_string()),
        };
        let record = ExceptionRecord::from_error(&err);

        assert_eq!(record.exc_type, "WrappingError");
        assert_eq!(record.msg, "outer failure\ncaused by: inner failure");
    }

    #[test]
    fn test_exception_record_json_keys() {
        let err = BoomError("kaput".to_string());
        let data = ExceptionRecord::from_error(&err).as_json();

        assert_eq!(data["loccer_type"], "exception");
        assert_eq!(data["exc_type"], "BoomError");
        assert_eq!(data["msg"], "kaput");
        assert!(data["timestamp"].is_string());
        assert!(data["integrations"].is_object());
        assert!(data["frames"].is_array());
        assert!(data.get("globals").is_none());
    }

    #[test]
    fn test_frame_json_keys() {
        let frame = Frame::new("src/main.rs", Some(3), "main")
            .with_locals([("request_id", &"abc-123" as &dyn fmt::Debug)]);
        let data = serde_json::to_value(&frame).unwrap();

        assert_eq!(data["filename"], "src/main.rs");
        assert_eq!(data["lineno"], 3);
        assert_eq!(data["name"], "main");
        assert!(data["line"].is_null());
        assert_eq!(data["locals"]["request_id"], "\"abc-123\"");
    }

    #[test]
    fn test_globals_use_guarded_repr() {
        let record = ExceptionRecord::new("panic", "boom")
            .with_globals([("fine", Box::new("value") as Box<dyn fmt::Debug>),
                           ("broken", Box::new(ReprFail) as Box<dyn fmt::Debug>)]);
        let data = record.as_json();

        assert_eq!(data["globals"]["fine"], "\"value\"");
        assert_eq!(
            data["globals"]["broken"],
            "Error getting repr of the object: `no repr here`"
        );
    }

    #[test]
    fn test_metadata_record_json() {
        let record = MetadataRecord::new(json!({"key": "value"}));
        let data = record.as_json();

        assert_eq!(data["loccer_type"], "metadata_log");
        assert_eq!(data["data"]["key"], "value");
        assert!(data["integrations"].is_object());
    }

    #[test]
    fn test_session_ids_unique() {
        let first = Session::new();
        let second = Session::new();
        assert_ne!(first.session_id(), second.session_id());
    }

    #[test]
    fn test_session_captured_latches() {
        let session = Session::new();
        assert!(!session.captured());
        assert!(!session.mark_captured());
        assert!(session.captured());
        assert!(session.mark_captured());
        assert!(session.captured());
    }

    #[test]
    fn test_session_json_keys() {
        let session = Session::new();
        session.resolve_data(&[]);
        let data = session.as_json();

        assert_eq!(data["loccer_type"], "session");
        assert_eq!(data["session_id"], session.session_id());
        assert!(data["data"].is_object());
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let first = MetadataRecord::new(1);
        let second = MetadataRecord::new(2);
        assert!(second.timestamp() >= first.timestamp());
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<std::io::Error>(), "Error");
        assert_eq!(short_type_name::<BoomError>(), "BoomError");
    }

    #[test]
    fn test_record_kind_discriminators() {
        assert_eq!(RecordKind::Session.as_str(), "session");
        assert_eq!(RecordKind::Exception.as_str(), "exception");
        assert_eq!(RecordKind::MetadataLog.as_str(), "metadata_log");
    }
}
