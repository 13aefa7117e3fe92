//! # Loccer
//!
//! Uncaught-error capture and reporting: install a process-wide hook,
//! enrich every captured failure with contextual data from pluggable
//! integrations, and hand the resulting structured record to one or
//! more sinks.
//!
//! ## Features
//!
//! - **Panic capture**: a composable global panic hook with explicit
//!   install/restore lifecycle and previous-hook chaining
//! - **Structured records**: session, exception and metadata records
//!   with a stable JSON form
//! - **Integrations**: per-event and once-per-session contextual data,
//!   with per-integration fault isolation
//! - **Sinks**: stderr, stream, in-memory, and a rotating file sink
//!   with numbered gzip backups
//!
//! ## Quick Start
//!
//! ```no_run
//! fn main() -> loccer::Result<()> {
//!     let _dispatcher = loccer::install()?;
//!
//!     // From here on, panics are reported to stderr, and errors held
//!     // as values can be captured explicitly:
//!     if let Err(err) = std::fs::read_to_string("config.toml") {
//!         loccer::capture_error(&err)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod dispatcher;
pub mod hook;
pub mod integration;
pub mod integrations;
pub mod record;
pub mod repr;
pub mod rotation;
pub mod sinks;


pub use capture::CaptureContext;
pub use dispatcher::Dispatcher;
pub use hook::{current, install, install_with, restore, InstallOptions};
pub use integration::Integration;
pub use integrations::platform::PlatformIntegration;
pub use integrations::resources::ResourcesIntegration;
pub use integrations::tokio_runtime::TokioIntegration;
pub use record::{ExceptionRecord, Frame, MetadataRecord, Record, RecordKind, Session};
pub use repr::best_effort_repr;
pub use rotation::{FileSink, FileSinkOptions};
pub use sinks::{InMemorySink, NullSink, Sink, StderrSink, StreamSink};

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Capture-pipeline errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Integration {name:?} failed to activate")]
    Activation {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Capture an error value through the currently active context.
pub fn capture_error<E: std::error::Error + ?Sized>(err: &E) -> Result<()> {
    hook::current().from_error(err)
}

/// Emit a metadata record through the currently active context.
pub fn log_metadata<T: serde::Serialize>(data: T) -> Result<()> {
    hook::current().log_metadata(data)
}
