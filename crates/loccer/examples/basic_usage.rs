//! Basic capture usage example
//!
//! This example installs the capture hook with a rotating file sink,
//! logs some metadata, captures an error held as a value, and finally
//! lets a panic reach the hook.
//!
//! Run with: cargo run --example basic_usage

use std::sync::Arc;

use loccer::{
    FileSink, FileSinkOptions, InstallOptions, PlatformIntegration, ResourcesIntegration,
    StderrSink,
};

fn main() -> loccer::Result<()> {
    println!("Installing the capture hook...");

    let file_sink = FileSink::with_options(
        "./example_errors.json",
        FileSinkOptions {
            compressed: true,
            max_size: 64 * 1024,
            max_files: 3,
        },
    )?;

    let dispatcher = loccer::install_with(
        InstallOptions::new()
            .sinks(vec![Box::new(StderrSink::new()), Box::new(file_sink)])
            .integrations(vec![
                Arc::new(PlatformIntegration::new()),
                Arc::new(ResourcesIntegration::new()),
            ]),
    )?;

    println!("Session id: {}", dispatcher.session().session_id());

    // Arbitrary context can be logged at any point; the first record
    // also flushes the one-time session data to every sink.
    loccer::log_metadata(serde_json::json!({
        "stage": "example",
        "build": env!("CARGO_PKG_VERSION"),
    }))?;

    // Errors held as values are captured explicitly.
    if let Err(err) = std::fs::read_to_string("/does/not/exist") {
        loccer::capture_error(&err)?;
    }

    // Scoped capture hands the error back after reporting it.
    let parsed: Result<i32, _> = loccer::current().run(|| "not a number".parse::<i32>());
    println!("Scoped capture returned: {parsed:?}");

    println!("Panicking now; the hook writes the report before the process dies.");
    panic!("example panic");
}
