//! Output sink contract and the stream, stderr, in-memory and null sinks

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::dispatcher::Dispatcher;
use crate::record::Record;
use crate::Result;

/// A consumption target for records.
///
/// `output` persists or transmits one record as a single self-contained
/// unit. Sink failures are not recovered by the dispatcher: they
/// propagate to the caller of `emit`, since swallowing them would
/// silently drop error reports.
pub trait Sink: Send + Sync {
    fn output(&self, record: &dyn Record, dispatcher: &Dispatcher) -> Result<()>;
}

/// Serialize a record and inject the owning session's id at top level.
pub fn record_json(record: &dyn Record, dispatcher: &Dispatcher) -> Value {
    let mut data = record.as_json();
    if let Value::Object(map) = &mut data {
        map.insert(
            "session_id".to_string(),
            Value::String(dispatcher.session().session_id().to_string()),
        );
    }
    data
}

/// Render a record to its textual form: one line when `compressed`,
/// 2-space-indented otherwise. Either way the result is one record per
/// call, terminated by the caller with a single trailing newline.
pub fn render_record(
    record: &dyn Record,
    dispatcher: &Dispatcher,
    compressed: bool,
) -> Result<String> {
    let data = record_json(record, dispatcher);
    let rendered = if compressed {
        serde_json::to_string(&data)?
    } else {
        serde_json::to_string_pretty(&data)?
    };
    Ok(rendered)
}

/// Sink writing rendered records to any writer.
pub struct StreamSink<W: Write + Send> {
    writer: Mutex<W>,
    compressed: bool,
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            compressed: true,
        }
    }

    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    /// Consume the sink and hand back the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|err| err.into_inner())
    }
}

impl<W: Write + Send> Sink for StreamSink<W> {
    fn output(&self, record: &dyn Record, dispatcher: &Dispatcher) -> Result<()> {
        let data = render_record(record, dispatcher, self.compressed)?;
        let mut writer = self.writer.lock().unwrap_or_else(|err| err.into_inner());
        writeln!(writer, "{data}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Default sink: indented records on standard error.
pub struct StderrSink {
    inner: StreamSink<io::Stderr>,
}

impl StderrSink {
    pub fn new() -> Self {
        Self {
            inner: StreamSink::new(io::stderr()).with_compression(false),
        }
    }
}

impl Default for StderrSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for StderrSink {
    fn output(&self, record: &dyn Record, dispatcher: &Dispatcher) -> Result<()> {
        self.inner.output(record, dispatcher)
    }
}

/// Sink collecting serialized records in memory, for tests and
/// embedding.
#[derive(Clone, Default)]
pub struct InMemorySink {
    records: Arc<Mutex<Vec<Value>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything collected so far, in emission order.
    pub fn records(&self) -> Vec<Value> {
        self.records.lock().unwrap_or_else(|err| err.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|err| err.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for InMemorySink {
    fn output(&self, record: &dyn Record, dispatcher: &Dispatcher) -> Result<()> {
        let data = record_json(record, dispatcher);
        self.records
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(data);
        Ok(())
    }
}

/// Sink that discards every record.
#[derive(Clone, Copy, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn output(&self, _record: &dyn Record, _dispatcher: &Dispatcher) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MetadataRecord;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Vec::new(), Vec::new(), false).unwrap()
    }

    #[test]
    fn test_compressed_render_is_single_line() {
        let dispatcher = dispatcher();
        let record = MetadataRecord::new(json!({"key": "value"}));
        let rendered = render_record(&record, &dispatcher, true).unwrap();

        assert_eq!(rendered.lines().count(), 1);
        let decoded: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(decoded["session_id"], dispatcher.session().session_id());
    }

    #[test]
    fn test_indented_render_spans_lines_but_decodes_equal() {
        let dispatcher = dispatcher();
        let record = MetadataRecord::new(json!({"key": "value"}));

        let compact = render_record(&record, &dispatcher, true).unwrap();
        let indented = render_record(&record, &dispatcher, false).unwrap();

        assert!(indented.lines().count() > 1);
        let compact: Value = serde_json::from_str(&compact).unwrap();
        let indented: Value = serde_json::from_str(&indented).unwrap();
        assert_eq!(compact, indented);
    }

    #[test]
    fn test_stream_sink_writes_one_line_per_record() {
        let dispatcher = dispatcher();
        let sink = StreamSink::new(Vec::new());

        let record = MetadataRecord::new("first");
        sink.output(&record, &dispatcher).unwrap();
        let record = MetadataRecord::new("second");
        sink.output(&record, &dispatcher).unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let decoded: Value = serde_json::from_str(line).unwrap();
            assert_eq!(decoded["loccer_type"], "metadata_log");
        }
    }

    #[test]
    fn test_in_memory_sink_collects_with_session_id() {
        let dispatcher = dispatcher();
        let sink = InMemorySink::new();
        assert!(sink.is_empty());

        let record = MetadataRecord::new(json!({"n": 1}));
        sink.output(&record, &dispatcher).unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["data"]["n"], 1);
        assert_eq!(records[0]["session_id"], dispatcher.session().session_id());
    }

    #[test]
    fn test_null_sink_discards() {
        let dispatcher = dispatcher();
        let record = MetadataRecord::new("dropped");
        NullSink.output(&record, &dispatcher).unwrap();
    }
}
