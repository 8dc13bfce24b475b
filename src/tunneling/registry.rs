use std::{fs::File, io::Read, path::Path};

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// number of columns in a registry row: id, address, created_at, local_port
const COLUMNS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TunnelRecord {
    /// identifier of the remote host the tunnel goes through
    pub id: String,
    /// public address of the remote host
    pub address: String,
    pub created_at: DateTime<FixedOffset>,
    /// port of the local SOCKS listener forwarding to the remote host
    pub local_port: u16,
}

/// The pool of tunnels available to a session. Never empty, never modified after load.
#[derive(Debug)]
pub(crate) struct Registry {
    tunnels: Vec<TunnelRecord>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unable to open registry: {1}")]
    Io(std::io::Error, String),
    #[error("unable to read registry: {1}")]
    Csv(csv::Error, String),
    #[error("registry row {row}: expected 4 columns, found {found}")]
    ColumnCount { row: usize, found: usize },
    #[error("registry row {row}: invalid local port {value:?}")]
    InvalidPort { row: usize, value: String },
    #[error("registry row {row}: invalid creation time {value:?}: {reason}")]
    InvalidTimestamp {
        row: usize,
        value: String,
        reason: String,
    },
    #[error("registry contains no tunnels")]
    Empty,
}
impl From<std::io::Error> for RegistryError {
    fn from(value: std::io::Error) -> Self {
        let str = value.to_string();
        Self::Io(value, str)
    }
}
impl From<csv::Error> for RegistryError {
    fn from(value: csv::Error) -> Self {
        let str_val = value.to_string();
        Self::Csv(value, str_val)
    }
}

impl Registry {
    pub fn load(path: &Path) -> Result<Registry, RegistryError> {
        Registry::from_reader(File::open(path)?)
    }
    pub fn from_reader<R: Read>(source: R) -> Result<Registry, RegistryError> {
        Registry::parse(Registry::reader().from_reader(source))
    }
    pub fn from_tunnels(tunnels: Vec<TunnelRecord>) -> Result<Registry, RegistryError> {
        if tunnels.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Registry { tunnels })
    }
    pub fn tunnels(&self) -> &[TunnelRecord] {
        &self.tunnels
    }
    pub fn len(&self) -> usize {
        self.tunnels.len()
    }
    fn reader() -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        // column count is checked per row, so a short row is reported with its number
        builder
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All);
        builder
    }
    fn parse<R: Read>(mut reader: csv::Reader<R>) -> Result<Registry, RegistryError> {
        let mut tunnels = Vec::new();
        for (index, record) in reader.records().enumerate() {
            tunnels.push(parse_row(index + 1, &record?)?);
        }
        Registry::from_tunnels(tunnels)
    }
}

fn parse_row(row: usize, record: &csv::StringRecord) -> Result<TunnelRecord, RegistryError> {
    if record.len() != COLUMNS {
        return Err(RegistryError::ColumnCount {
            row,
            found: record.len(),
        });
    }
    let created_at =
        DateTime::parse_from_rfc3339(&record[2]).map_err(|e| RegistryError::InvalidTimestamp {
            row,
            value: record[2].to_string(),
            reason: e.to_string(),
        })?;
    let local_port = match record[3].parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => {
            return Err(RegistryError::InvalidPort {
                row,
                value: record[3].to_string(),
            });
        }
    };
    Ok(TunnelRecord {
        id: record[0].to_string(),
        address: record[1].to_string(),
        created_at,
        local_port,
    })
}
