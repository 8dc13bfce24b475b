use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "proxyspray runs your commands through a random SOCKS tunnel from your pool and logs every run", long_about = None)]
pub(crate) struct SprayCli {
    /// custom config file
    #[arg(short, long)]
    pub config: Option<String>,
    /// tunnel registry csv, takes precedence over the config file
    #[arg(short, long)]
    pub registry: Option<String>,
    /// hand each input line to `sh -c` instead of splitting it into arguments.
    /// enables pipes and redirections, and everything else a shell does with the text
    #[arg(long)]
    pub shell: bool,
    #[command(subcommand)]
    pub front_end: FrontEnd,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
pub(crate) enum FrontEnd {
    /// run arbitrary commands through proxychains
    Exec,
    /// run nmap with the tunnel as its proxy
    Scan,
}
