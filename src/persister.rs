//! Writes a finished session to the rating log.
//!
//! The log is plain comma separated text, one `timestamp,rating` record per
//! line and no header, opened in append mode so earlier sessions in the
//! same file are never touched.

use crate::error::PersistenceError;
use crate::session_buffer::TimestampedRating;

use log::{info, warn};
use std::{
    borrow::Cow,
    fs::OpenOptions,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// What became of a buffer handed to [Persister::append].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// This many records were appended to the file.
    Written(usize, PathBuf),
    /// No destination was set, so this many records were discarded.
    Dropped(usize),
}

/// Appends sessions to the log at `destination`.
#[derive(Debug, Clone, Default)]
pub struct Persister {
    destination: Option<PathBuf>,
}

impl Persister {
    /// A persister with no destination yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear where sessions go.
    pub fn set_destination(&mut self, destination: Option<PathBuf>) {
        self.destination = destination;
    }

    /// Where sessions go, if anywhere.
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Append every record, in order, one line each. Each line is written
    /// whole, so a failure part way loses only what was not yet written.
    pub fn append(&self, records: &[TimestampedRating]) -> Result<PersistOutcome, PersistenceError> {
        let Some(path) = self.destination.as_ref() else {
            if !records.is_empty() {
                warn!(
                    "No output destination, dropping {} ratings.",
                    records.len()
                );
            }
            return Ok(PersistOutcome::Dropped(records.len()));
        };

        let fail = |written, error| PersistenceError {
            path: path.clone(),
            written,
            error,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| fail(0, e))?;
        let mut writer = BufWriter::new(file);

        for (written, record) in records.iter().enumerate() {
            let line = format!("{},{}\n", record.offset, csv_field(record.value.as_str()));
            writer
                .write_all(line.as_bytes())
                .map_err(|e| fail(written, e))?;
        }
        writer.flush().map_err(|e| fail(records.len(), e))?;

        info!("Appended {} ratings to {}.", records.len(), path.display());
        Ok(PersistOutcome::Written(records.len(), path.clone()))
    }
}

/// Quote a field the way a CSV writer would, if it needs it.
pub fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::from(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::from(value)
    }
}
