use std::{io::ErrorKind, path::Path};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PATH: &str = "proxyspray.toml";

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SprayConfig {
    /// csv file listing the provisioned tunnels
    pub registry: String,
    pub proxy_type: ProxyType,
    pub selection: SelectionPolicy,
    pub verify: VerifyConfig,
    pub exec: ExecConfig,
    pub scan: ScanConfig,
}
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct VerifyConfig {
    /// endpoint answering with the caller's public address as plain text
    pub echo_url: String,
    pub timeout_secs: u64,
}
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ExecConfig {
    pub log: String,
    pub proxychains_bin: String,
    /// where the proxychains configuration is written before every command.
    /// when unset, a per-process file in the temp directory is used
    pub proxychains_conf: Option<String>,
}
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ScanConfig {
    pub log: String,
    pub nmap_bin: String,
}
#[derive(Deserialize, Debug, PartialEq, Clone, Copy, Default)]
pub(crate) enum ProxyType {
    #[default]
    #[serde(alias = "socks4", alias = "SOCKS4")]
    Socks4,
    #[serde(alias = "socks5", alias = "SOCKS5")]
    Socks5,
}
#[derive(Deserialize, Debug, PartialEq, Clone, Copy, Default)]
pub(crate) enum SelectionPolicy {
    /// independent draw on every command, the same tunnel may come up twice in a row
    #[default]
    #[serde(alias = "uniform", alias = "UNIFORM")]
    Uniform,
    /// never reuse the tunnel picked for the previous command (when there is a choice)
    #[serde(alias = "avoid_previous", alias = "AVOID_PREVIOUS")]
    AvoidPrevious,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config: {1}")]
    Io(std::io::Error, String),
    #[error("invalid config: {1}")]
    Parse(toml::de::Error, String),
}
impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        let str = value.to_string();
        Self::Io(value, str)
    }
}
impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        let str_val = value.to_string();
        Self::Parse(value, str_val)
    }
}

impl ProxyType {
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5",
        }
    }
}

impl Default for SprayConfig {
    fn default() -> Self {
        SprayConfig {
            registry: String::from("droplets.csv"),
            proxy_type: ProxyType::default(),
            selection: SelectionPolicy::default(),
            verify: VerifyConfig::default(),
            exec: ExecConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}
impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            echo_url: String::from("https://ipinfo.io/ip"),
            timeout_secs: 10,
        }
    }
}
impl Default for ExecConfig {
    fn default() -> Self {
        ExecConfig {
            log: String::from("command_log.csv"),
            proxychains_bin: String::from("proxychains"),
            proxychains_conf: None,
        }
    }
}
impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            log: String::from("nmap_command_log.csv"),
            nmap_bin: String::from("nmap"),
        }
    }
}

/// Loads the config named on the command line, or the default one.
///
/// Only the default file is allowed to be missing, an explicitly requested
/// file that cannot be read is an error.
pub(crate) fn load(explicit: Option<&str>) -> Result<SprayConfig, ConfigError> {
    match explicit {
        Some(path) => load_from(Path::new(path), true),
        None => load_from(Path::new(DEFAULT_PATH), false),
    }
}

pub(crate) fn load_from(path: &Path, required: bool) -> Result<SprayConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(e) if e.kind() == ErrorKind::NotFound && !required => {
            tracing::debug!("{} not found, using defaults", path.display());
            Ok(SprayConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}
