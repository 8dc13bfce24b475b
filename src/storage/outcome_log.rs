use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::{LogEntry, LogError};

/// Append-only csv log, one record per dispatched command.
pub(crate) struct OutcomeLogger {
    path: PathBuf,
}

impl OutcomeLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OutcomeLogger { path: path.into() }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Appends `entry`, creating the log if needed.
    ///
    /// The record is encoded in memory first and lands with a single write on
    /// an `O_APPEND` descriptor, so the file never ends with half a record.
    pub fn log(&self, entry: &LogEntry) -> Result<(), LogError> {
        let record = encode(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&record)?;
        file.sync_data()?;
        debug!(path = %self.path.display(), tunnel = %entry.tunnel_id, "outcome logged");
        Ok(())
    }
    #[cfg(test)]
    pub fn read_entries(&self) -> Result<Vec<LogEntry>, LogError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        let mut entries = Vec::new();
        for entry in reader.deserialize() {
            entries.push(entry?);
        }
        Ok(entries)
    }
}

fn encode(entry: &LogEntry) -> Result<Vec<u8>, LogError> {
    // every field quoted, so the command column is always a quoted string
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.serialize(entry)?;
    writer
        .into_inner()
        .map_err(|e| LogError::from(e.into_error()))
}
