//! `netinfo dns`: resolver configuration and forward lookups.

use anyhow::{Context, Result};
use colored::Colorize;

use super::{is_json, print_json, section};
use crate::config::Config;
use crate::domain::records::DnsRecord;
use crate::domain::Probe;

pub fn run(
    probe: &Probe,
    format: &str,
    resolve: Option<&str>,
    interface: Option<&str>,
) -> Result<()> {
    let rt = super::runtime()?;
    rt.block_on(run_async(probe, format, resolve, interface))
}

async fn run_async(
    probe: &Probe,
    format: &str,
    resolve: Option<&str>,
    interface: Option<&str>,
) -> Result<()> {
    if let Some(host) = resolve {
        let resolution = probe
            .resolve(host)
            .await
            .with_context(|| format!("resolving {}", host))?;
        if is_json(format) {
            return print_json(&resolution);
        }
        section(&format!("Resolve {}", host));
        for addr in resolution.ipv4.iter().chain(&resolution.ipv6) {
            println!("  {}", addr);
        }
        return Ok(());
    }

    if let Some(name) = interface {
        let record = probe.dns_for_interface(name).await?;
        if is_json(format) {
            return print_json(&record);
        }
        section("DNS servers");
        print_record(&record, probe.config());
        return Ok(());
    }

    let config = probe.dns_config().await?;
    if is_json(format) {
        return print_json(&config);
    }
    section("DNS servers");
    if config.servers.is_empty() {
        println!("  (none configured)");
    }
    for record in &config.servers {
        print_record(record, probe.config());
    }
    if !config.search_list.is_empty() {
        println!();
        section("Search domains");
        println!("  {}", config.search_list.join(" "));
    }
    Ok(())
}

fn print_record(record: &DnsRecord, config: &Config) {
    println!("  {}", record.interface.bold());
    for server in &record.all {
        match config.resolver_provider(server) {
            Some(provider) => println!("    {:<40} {}", server, provider.cyan()),
            None => println!("    {}", server),
        }
    }
}
