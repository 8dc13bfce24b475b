use chrono::Local;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::{
    config::{ConfigError, ProxyType},
    egress::EgressVerifier,
    executor::{CommandExecutor, ExitOutcome, Invocation, ShellMode, UserCommand},
    proxy::{ProxyConfigError, ProxyConfigurator},
    storage::{LogEntry, LogError, outcome_log::OutcomeLogger},
    tunneling::{
        registry::{Registry, RegistryError},
        selector::{SelectError, TunnelSelector},
    },
};

/// typed at the prompt (any case) to leave the loop
const EXIT_SENTINEL: &str = "exit";

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("tunnel selection error: {0}")]
    Selection(String),
    #[error("unable to record outcome: {0}")]
    OutcomeLog(String),
    #[error("proxy configuration error: {0}")]
    ProxyConfig(String),
    #[error("io error: {1}")]
    Io(std::io::Error, String),
}
impl From<ConfigError> for RelayError {
    fn from(err: ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}
impl From<RegistryError> for RelayError {
    fn from(err: RegistryError) -> Self {
        RelayError::Registry(err.to_string())
    }
}
impl From<SelectError> for RelayError {
    fn from(err: SelectError) -> Self {
        RelayError::Selection(err.to_string())
    }
}
impl From<LogError> for RelayError {
    fn from(err: LogError) -> Self {
        RelayError::OutcomeLog(err.to_string())
    }
}
impl From<ProxyConfigError> for RelayError {
    fn from(err: ProxyConfigError) -> Self {
        RelayError::ProxyConfig(err.to_string())
    }
}
impl From<std::io::Error> for RelayError {
    fn from(value: std::io::Error) -> Self {
        let str = value.to_string();
        Self::Io(value, str)
    }
}

/// Why a command line could not be assembled for the selected tunnel.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error(transparent)]
    ProxyConfig(#[from] ProxyConfigError),
    #[error("{0:?} cannot be quoted for the shell")]
    Unquotable(String),
}

/// Where a command goes once a tunnel has been picked.
pub(crate) enum Route {
    /// generic commands, wrapped with proxychains
    ProxyChains {
        binary: String,
        configurator: ProxyConfigurator,
    },
    /// nmap option strings, the tunnel is given to nmap as `--proxy`
    Scan {
        binary: String,
        proxy_type: ProxyType,
    },
}

impl Route {
    pub fn prompt(&self) -> &'static str {
        match self {
            Route::ProxyChains { .. } => "Enter the command to run (or 'exit' to quit): ",
            Route::Scan { .. } => "Enter nmap command options (or 'exit' to quit): ",
        }
    }
    /// Builds the command line for `command` going through `local_port`.
    /// For proxychains this rewrites the configuration file first.
    pub fn invocation(
        &self,
        local_port: u16,
        command: &UserCommand,
    ) -> Result<Invocation, RouteError> {
        match self {
            Route::ProxyChains {
                binary,
                configurator,
            } => {
                let conf = configurator.configure(local_port)?;
                let mut args = vec![String::from("-f"), conf.display().to_string()];
                match command {
                    UserCommand::Words(words) => args.extend(words.iter().cloned()),
                    UserCommand::Shell(text) => {
                        args.extend([String::from("sh"), String::from("-c"), text.clone()])
                    }
                }
                Ok(Invocation::new(binary.clone(), args))
            }
            Route::Scan { binary, proxy_type } => {
                let proxy = format!("{}://127.0.0.1:{}", proxy_type.scheme(), local_port);
                Ok(match command {
                    UserCommand::Words(words) => {
                        let mut args = vec![String::from("-Pn"), String::from("--proxy"), proxy];
                        args.extend(words.iter().cloned());
                        Invocation::new(binary.clone(), args)
                    }
                    UserCommand::Shell(text) => {
                        let program = shlex::try_quote(binary)
                            .map_err(|_| RouteError::Unquotable(binary.clone()))?;
                        Invocation::new(
                            "sh",
                            vec![
                                String::from("-c"),
                                format!("{program} -Pn --proxy {proxy} {text}"),
                            ],
                        )
                    }
                })
            }
        }
    }
}

/// What happened to one line of input.
#[derive(Debug, PartialEq)]
pub(crate) enum Dispatched {
    /// nothing was run and nothing was logged
    Skipped,
    Executed(ExitOutcome),
}

pub(crate) struct Relay {
    registry: Registry,
    selector: TunnelSelector,
    verifier: Box<dyn EgressVerifier>,
    executor: Box<dyn CommandExecutor>,
    route: Route,
    shell: ShellMode,
    logger: OutcomeLogger,
}

impl Relay {
    pub fn new(
        registry: Registry,
        selector: TunnelSelector,
        verifier: Box<dyn EgressVerifier>,
        executor: Box<dyn CommandExecutor>,
        route: Route,
        shell: ShellMode,
        logger: OutcomeLogger,
    ) -> Self {
        Relay {
            registry,
            selector,
            verifier,
            executor,
            route,
            shell,
            logger,
        }
    }

    /// Prompts for commands until `exit` or end of input.
    ///
    /// Failures of a single command are reported on `output` and the loop
    /// goes on, undecodable input lines included. Only a failed log write or
    /// a broken input/output stream ends it early.
    pub async fn run<R, W>(&mut self, mut input: R, output: &mut W) -> Result<(), RelayError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut raw = Vec::new();
        loop {
            output.write_all(self.route.prompt().as_bytes()).await?;
            output.flush().await?;
            raw.clear();
            if input.read_until(b'\n', &mut raw).await? == 0 {
                info!("input closed");
                say(output, "").await?;
                break;
            }
            let Ok(line) = std::str::from_utf8(&raw) else {
                warn!("ignoring input line that is not valid UTF-8");
                say(output, "Input is not valid UTF-8, ignored.").await?;
                continue;
            };
            let line = line.trim();
            if line.eq_ignore_ascii_case(EXIT_SENTINEL) {
                say(output, "Exiting...").await?;
                break;
            }
            if line.is_empty() {
                continue;
            }
            self.dispatch(line, output).await?;
        }
        Ok(())
    }

    /// select tunnel -> verify egress -> build invocation -> execute -> log
    pub async fn dispatch<W>(&mut self, text: &str, output: &mut W) -> Result<Dispatched, RelayError>
    where
        W: AsyncWrite + Unpin,
    {
        let command = match UserCommand::parse(text, self.shell) {
            Ok(command) => command,
            Err(e) => {
                say(output, &format!("Could not parse the command: {e}")).await?;
                return Ok(Dispatched::Skipped);
            }
        };

        let tunnel = self.selector.next(self.registry.tunnels())?;
        let local_port = tunnel.local_port;
        info!(
            tunnel = %tunnel.id,
            address = %tunnel.address,
            created_at = %tunnel.created_at,
            local_port,
            "tunnel selected"
        );

        let Some(external_ip) = self.verifier.verify(local_port).await else {
            warn!(tunnel = %tunnel.id, local_port, "skipping command, egress unknown");
            say(
                output,
                &format!("Failed to obtain external IP for local port {local_port}."),
            )
            .await?;
            return Ok(Dispatched::Skipped);
        };
        say(
            output,
            &format!("The external IP address using local port {local_port} is: {external_ip}"),
        )
        .await?;

        let invocation = match self.route.invocation(local_port, &command) {
            Ok(invocation) => invocation,
            Err(e) => {
                error!("{e}");
                say(output, &format!("Could not prepare the command: {e}")).await?;
                return Ok(Dispatched::Skipped);
            }
        };

        let timestamp = Local::now().naive_local();
        let status = self.executor.execute(&invocation).await;
        self.logger.log(&LogEntry {
            tunnel_id: tunnel.id.clone(),
            external_ip: Some(external_ip),
            timestamp,
            command: text.to_string(),
            status,
        })?;

        match status {
            ExitOutcome::Success => {
                say(output, &format!("Command logged and executed: {invocation}")).await?
            }
            ExitOutcome::Failure => {
                say(output, &format!("Command failed and was logged: {invocation}")).await?
            }
        }
        Ok(Dispatched::Executed(status))
    }
}

async fn say<W: AsyncWrite + Unpin>(output: &mut W, message: &str) -> Result<(), RelayError> {
    output.write_all(message.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
