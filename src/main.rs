use std::{path::Path, time::Duration};

use clap::Parser;
use cli::{FrontEnd, SprayCli};
use egress::HttpEgressVerifier;
use executor::{ProcessExecutor, ShellMode};
use proxy::ProxyConfigurator;
use relay::{Relay, RelayError, Route};
use storage::outcome_log::OutcomeLogger;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use tunneling::{registry::Registry, selector::TunnelSelector};

mod cli;
mod config;
mod egress;
mod executor;
mod proxy;
mod relay;
mod storage;
mod tunneling;

#[tokio::main]
pub async fn main() -> Result<(), RelayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = SprayCli::parse();
    let config = config::load(cli.config.as_deref())?;
    let registry_path = cli.registry.unwrap_or(config.registry);
    let registry = Registry::load(Path::new(&registry_path))?;
    tracing::info!("{} tunnels loaded from {}", registry.len(), registry_path);

    let (route, log_path) = match cli.front_end {
        FrontEnd::Exec => {
            let configurator = match config.exec.proxychains_conf {
                Some(path) => ProxyConfigurator::new(path, config.proxy_type),
                None => ProxyConfigurator::in_temp_dir(config.proxy_type)?,
            };
            (
                Route::ProxyChains {
                    binary: config.exec.proxychains_bin,
                    configurator,
                },
                config.exec.log,
            )
        }
        FrontEnd::Scan => (
            Route::Scan {
                binary: config.scan.nmap_bin,
                proxy_type: config.proxy_type,
            },
            config.scan.log,
        ),
    };
    let shell = if cli.shell {
        tracing::warn!("shell passthrough enabled, input lines are interpreted by sh");
        ShellMode::Passthrough
    } else {
        ShellMode::ArgumentVector
    };

    let logger = OutcomeLogger::new(log_path);
    tracing::info!("recording outcomes in {}", logger.path().display());

    let mut relay = Relay::new(
        registry,
        TunnelSelector::new(config.selection),
        Box::new(HttpEgressVerifier::new(
            config.verify.echo_url,
            Duration::from_secs(config.verify.timeout_secs),
        )),
        Box::new(ProcessExecutor),
        route,
        shell,
        logger,
    );
    let mut stdout = tokio::io::stdout();
    relay
        .run(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await
}
