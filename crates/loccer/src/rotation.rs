//! File sink with generational compressed rotation

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::dispatcher::Dispatcher;
use crate::record::Record;
use crate::sinks::{render_record, Sink};
use crate::{Error, Result};

/// Default rotation threshold: 10 MiB.
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of compressed backups kept.
pub const DEFAULT_MAX_FILES: u32 = 10;

/// Tunables for [`FileSink`].
#[derive(Debug, Clone)]
pub struct FileSinkOptions {
    /// Single-line records instead of indented ones.
    pub compressed: bool,
    /// Rotation threshold in bytes; `0` disables rotation entirely.
    pub max_size: u64,
    /// Number of compressed backup generations to keep.
    pub max_files: u32,
}

impl Default for FileSinkOptions {
    fn default() -> Self {
        Self {
            compressed: true,
            max_size: DEFAULT_MAX_SIZE,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

/// Sink appending one record per call to a file, rotating it through
/// numbered gzip backups (`<path>.<generation>.gz`, generation 0 most
/// recent) once it reaches `max_size`.
pub struct FileSink {
    path: PathBuf,
    options: FileSinkOptions,
}

impl FileSink {
    /// Create a sink with default options.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(path, FileSinkOptions::default())
    }

    /// Create a sink, validating the rotation configuration.
    ///
    /// A nonzero `max_size` of 10 bytes or less is rejected: it would
    /// rotate on every single write.
    pub fn with_options(path: impl Into<PathBuf>, options: FileSinkOptions) -> Result<Self> {
        if options.max_size != 0 && options.max_size <= 10 {
            return Err(Error::Config {
                message: "max_size must be greater than 10 bytes (or 0 to disable rotation)"
                    .to_string(),
            });
        }

        Ok(Self {
            path: path.into(),
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn output(&self, record: &dyn Record, dispatcher: &Dispatcher) -> Result<()> {
        let data = render_record(record, dispatcher, self.options.compressed)?;

        {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{data}")?;
        }

        if self.options.max_size > 0 {
            rotate(&self.path, self.options.max_size, self.options.max_files)?;
        }

        Ok(())
    }
}

/// Path of a numbered backup generation.
fn backup_path(path: &Path, generation: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{generation}.gz"));
    PathBuf::from(name)
}

/// Rotate `path` if it has reached `max_size`: shift the existing
/// backups one generation up (the oldest falls off the end), compress
/// the live file's contents into generation 0, then truncate the live
/// file in place so concurrent writers keep a valid handle.
///
/// With `max_files == 0` no backup is produced; the live file is simply
/// truncated. Returns whether a rotation happened.
pub fn rotate(path: &Path, max_size: u64, max_files: u32) -> Result<bool> {
    let metadata = fs::metadata(path)?;
    if metadata.len() < max_size {
        return Ok(false);
    }

    for generation in (1..max_files).rev() {
        let from = backup_path(path, generation - 1);
        if from.exists() {
            fs::rename(&from, backup_path(path, generation))?;
        }
    }

    let mut live = OpenOptions::new().read(true).write(true).open(path)?;

    if max_files > 0 {
        let backup = File::create(backup_path(path, 0))?;
        let mut encoder = GzEncoder::new(backup, Compression::default());
        io::copy(&mut live, &mut encoder)?;
        encoder.finish()?;
    }

    live.seek(SeekFrom::Start(0))?;
    live.set_len(0)?;

    tracing::debug!(file = %path.display(), "error log rotated");
    Ok(true)
}
