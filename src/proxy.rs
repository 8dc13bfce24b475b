use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;
use tracing::debug;

use crate::config::ProxyType;

/// Writes the proxychains configuration pointing at a single tunnel.
///
/// The file is owned by this process and handed to proxychains explicitly
/// (`proxychains -f <path>`), so two running instances never share it.
pub(crate) struct ProxyConfigurator {
    path: PathBuf,
    proxy_type: ProxyType,
    /// private directory holding `path` when no location was configured,
    /// removed together with the configurator
    _workdir: Option<TempDir>,
}

#[derive(Error, Debug)]
pub enum ProxyConfigError {
    #[error("unable to write proxy configuration {0}: {2}")]
    Io(String, std::io::Error, String),
}

impl ProxyConfigurator {
    pub fn new(path: impl Into<PathBuf>, proxy_type: ProxyType) -> Self {
        ProxyConfigurator {
            path: path.into(),
            proxy_type,
            _workdir: None,
        }
    }
    /// Keeps the configuration in a fresh, randomly named directory under the
    /// system temp dir. Used when the config file does not name a location.
    pub fn in_temp_dir(proxy_type: ProxyType) -> Result<Self, ProxyConfigError> {
        let workdir = tempfile::Builder::new()
            .prefix("proxyspray-")
            .tempdir()
            .map_err(|e| {
                let str_val = e.to_string();
                ProxyConfigError::Io(std::env::temp_dir().display().to_string(), e, str_val)
            })?;
        Ok(ProxyConfigurator {
            path: workdir.path().join("proxychains.conf"),
            proxy_type,
            _workdir: Some(workdir),
        })
    }
    pub fn render(&self, local_port: u16) -> String {
        format!(
            "strict_chain\nquiet_mode\n[ProxyList]\n{} 127.0.0.1 {}\n",
            self.proxy_type.scheme(),
            local_port
        )
    }
    /// Replaces the whole configuration with one pointing at `local_port`.
    ///
    /// The new content goes to an exclusively created, randomly named file
    /// next to the target, then is renamed over it. Nothing pre-existing at
    /// either name is ever opened for writing.
    pub fn configure(&self, local_port: u16) -> Result<&Path, ProxyConfigError> {
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut staging = NamedTempFile::new_in(parent).map_err(|e| self.io_error(e))?;
        staging
            .write_all(self.render(local_port).as_bytes())
            .map_err(|e| self.io_error(e))?;
        staging
            .persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        debug!(local_port, path = %self.path.display(), "proxychains configured");
        Ok(&self.path)
    }
    fn io_error(&self, err: std::io::Error) -> ProxyConfigError {
        let str_val = err.to_string();
        ProxyConfigError::Io(self.path.display().to_string(), err, str_val)
    }
}
