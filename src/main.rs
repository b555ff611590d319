mod commands;
mod config;
mod domain;
mod error;
mod platform;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use crate::domain::Probe;
use crate::error::ErrorReport;

#[derive(Parser)]
#[command(name = "netinfo", version, about = "Cross-platform network diagnostics")]
struct Cli {
    /// Output format (table or json)
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Path to config file (default: ~/.config/netinfo/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List network interfaces
    Interfaces {
        /// Show a single interface
        name: Option<String>,

        /// Only interfaces that are up and have addresses
        #[arg(long)]
        active: bool,
    },

    /// Local and public IP addresses
    Ip {
        /// Skip the public address lookup
        #[arg(long)]
        no_public: bool,

        /// Geolocate the public address
        #[arg(long, conflicts_with = "no_public")]
        locate: bool,
    },

    /// DNS servers, search domains and lookups
    Dns {
        /// Resolve a hostname instead of listing servers
        #[arg(long)]
        resolve: Option<String>,

        /// Servers configured for one interface
        #[arg(long, conflicts_with = "resolve")]
        interface: Option<String>,
    },

    /// Default gateways
    Gateway {
        /// Only the default gateway of this family (v4 or v6)
        #[arg(long)]
        family: Option<String>,
    },

    /// Routing table
    Routes {
        /// Only routes through this interface
        #[arg(long)]
        interface: Option<String>,

        /// Only default routes
        #[arg(long)]
        defaults: bool,

        /// Counts by type, protocol and interface
        #[arg(long)]
        summary: bool,
    },

    /// Active sockets and their processes
    Connections {
        /// Listening ports with service names
        #[arg(long)]
        listening: bool,

        /// Totals per process
        #[arg(long, conflicts_with = "listening")]
        by_process: bool,

        /// Connections on a local or remote port
        #[arg(long, conflicts_with_all = ["listening", "by_process"])]
        port: Option<u16>,
    },

    /// Ping a host
    Ping {
        host: String,

        /// Number of echo requests (overrides config)
        #[arg(long, short = 'c')]
        count: Option<u32>,
    },

    /// Ping several hosts in turn (configured defaults when none given)
    PingMany { hosts: Vec<String> },

    /// Check loopback, gateway, DNS server and internet reachability
    Connectivity,

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        let report = ErrorReport::new("netinfo", e);
        debug!(kind = ?report.kind, at = %report.captured_at, error = %report, "command failed");
        eprintln!("{} {}", "error:".red().bold(), report.user_message().red());
        if report.should_retry() {
            eprintln!("  {}", "hint: set max_retries in the config file to retry automatically".dimmed());
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    commands::check_format(&cli.format)?;
    let cfg = config::load(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&cfg.log_level), cli.log_json);

    let platform = platform::detect()?;
    debug!(
        os = %platform.os,
        hostname = %platform.hostname,
        elevated = platform.elevated,
        wsl = platform.is_wsl,
        "platform detected"
    );
    let probe = Probe::new(platform.os, cfg).context("initializing network probe")?;
    let format = cli.format.as_str();

    match cli.command {
        Commands::Interfaces { name, active } => {
            commands::interfaces::run(&probe, format, name.as_deref(), active)
        }
        Commands::Ip { no_public, locate } => commands::ip::run(&probe, format, no_public, locate),
        Commands::Dns { resolve, interface } => {
            commands::dns::run(&probe, format, resolve.as_deref(), interface.as_deref())
        }
        Commands::Gateway { family } => commands::gateway::run(&probe, format, family.as_deref()),
        Commands::Routes {
            interface,
            defaults,
            summary,
        } => commands::routes::run(&probe, format, interface.as_deref(), defaults, summary),
        Commands::Connections {
            listening,
            by_process,
            port,
        } => {
            if listening && !platform.elevated {
                debug!("not elevated; other users' sockets may lack process names");
            }
            commands::connections::run(&probe, format, listening, by_process, port)
        }
        Commands::Ping { host, count } => commands::ping::run(&probe, format, &host, count),
        Commands::PingMany { hosts } => commands::ping::run_many(&probe, format, hosts),
        Commands::Connectivity => commands::connectivity::run(&probe, format),
        Commands::Config => commands::config::run(probe.config(), format, cli.config.as_deref()),
    }
}

/// Logs go to stderr so table and JSON output stay clean on stdout.
fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["netinfo", "routes", "--summary", "--format", "json"]);
        assert_eq!(cli.format, "json");
        assert!(matches!(
            cli.command,
            Commands::Routes { summary: true, .. }
        ));
    }

    #[test]
    fn ping_many_takes_hosts() {
        let cli = Cli::parse_from(["netinfo", "ping-many", "1.1.1.1", "example.com"]);
        match cli.command {
            Commands::PingMany { hosts } => assert_eq!(hosts, vec!["1.1.1.1", "example.com"]),
            _ => panic!("expected ping-many"),
        }
    }

    #[test]
    fn conflicting_connection_views_rejected() {
        assert!(Cli::try_parse_from(["netinfo", "connections", "--listening", "--by-process"]).is_err());
    }
}
