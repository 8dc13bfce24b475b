use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::ExitOutcome;

pub(crate) mod outcome_log;

/// One dispatched command, as recorded in the outcome log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LogEntry {
    pub tunnel_id: String,
    /// empty in the log when the address was never observed
    pub external_ip: Option<String>,
    #[serde(with = "log_timestamp")]
    pub timestamp: NaiveDateTime,
    /// the text as typed at the prompt, without the proxy wrapper
    pub command: String,
    pub status: ExitOutcome,
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("outcome log io error: {1}")]
    Io(std::io::Error, String),
    #[error("outcome log encoding error: {1}")]
    Csv(csv::Error, String),
}
impl From<std::io::Error> for LogError {
    fn from(value: std::io::Error) -> Self {
        let str = value.to_string();
        Self::Io(value, str)
    }
}
impl From<csv::Error> for LogError {
    fn from(value: csv::Error) -> Self {
        let str_val = value.to_string();
        Self::Csv(value, str_val)
    }
}

mod log_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(de::Error::custom)
    }
}
