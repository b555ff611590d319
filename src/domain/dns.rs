use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::powershell;
use super::records::{DnsConfig, DnsRecord, Resolution, SYSTEM_INTERFACE};
use super::runner::CommandRunner;
use crate::error::NetError;
use crate::platform::Os;

const WINDOWS_DNS_SCRIPT: &str = "Get-DnsClientServerAddress -AddressFamily IPv4,IPv6 | Select-Object InterfaceAlias, ServerAddresses | ConvertTo-Json";

pub enum DnsAdapter {
    /// Per-interface servers from the Windows DNS client.
    PowerShell { timeout: Duration },
    /// A resolver configuration file (`/etc/resolv.conf`).
    ResolvConf { path: PathBuf },
}

impl DnsAdapter {
    pub fn for_os(os: Os, timeout: Duration, resolv_conf: PathBuf) -> Self {
        match os {
            Os::Windows => DnsAdapter::PowerShell { timeout },
            Os::Linux | Os::MacOS => DnsAdapter::ResolvConf { path: resolv_conf },
        }
    }

    pub async fn config(&self, runner: &dyn CommandRunner) -> Result<DnsConfig, NetError> {
        match self {
            DnsAdapter::PowerShell { timeout } => {
                let out = powershell::run(runner, WINDOWS_DNS_SCRIPT, *timeout).await?;
                parse_windows_dns(&out)
            }
            DnsAdapter::ResolvConf { path } => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| NetError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                Ok(parse_resolv_conf(&content))
            }
        }
    }

    pub async fn servers_for_interface(
        &self,
        runner: &dyn CommandRunner,
        interface: &str,
    ) -> Result<DnsRecord, NetError> {
        self.config(runner)
            .await?
            .servers
            .into_iter()
            .find(|r| r.interface == interface)
            .ok_or_else(|| NetError::NotFound(format!("DNS servers for interface {}", interface)))
    }
}

/// Parse resolver configuration. Every `nameserver` line adds one server to
/// the single `system` record; `search` and `domain` extend the search list.
pub fn parse_resolv_conf(content: &str) -> DnsConfig {
    let mut config = DnsConfig::default();
    let mut system = DnsRecord::new(SYSTEM_INTERFACE);

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        match fields[0] {
            "nameserver" => system.push_server(fields[1]),
            "search" | "domain" => config
                .search_list
                .extend(fields[1..].iter().map(|s| s.to_string())),
            _ => {}
        }
    }

    if !system.all.is_empty() {
        config.servers.push(system);
    }
    config
}

/// Parse `Get-DnsClientServerAddress` JSON. Interfaces without servers are
/// dropped.
pub fn parse_windows_dns(output: &str) -> Result<DnsConfig, NetError> {
    let objects = powershell::objects(output, "Get-DnsClientServerAddress output")?;
    let mut config = DnsConfig::default();

    for entry in &objects {
        let interface = powershell::str_field(entry, "InterfaceAlias");
        if interface.is_empty() {
            continue;
        }
        // the cmdlet reports each family separately; merge per interface
        let position = match config.servers.iter().position(|r| r.interface == interface) {
            Some(i) => i,
            None => {
                config.servers.push(DnsRecord::new(interface));
                config.servers.len() - 1
            }
        };
        for server in powershell::str_list(entry, "ServerAddresses") {
            config.servers[position].push_server(&server);
        }
    }

    config.servers.retain(|r| !r.all.is_empty());
    Ok(config)
}

/// Forward lookup through the system resolver.
pub async fn resolve(host: &str, timeout: Duration) -> Result<Resolution, NetError> {
    let lookup = tokio::time::timeout(timeout, tokio::net::lookup_host((host, 0)))
        .await
        .map_err(|_| NetError::Deadline {
            operation: "dns lookup",
            deadline: timeout,
        })?;
    let addrs = lookup.map_err(|e| {
        debug!(host = %host, error = %e, "lookup failed");
        NetError::NotFound(format!("host {}", host))
    })?;

    let mut resolution = Resolution {
        host: host.to_string(),
        ..Default::default()
    };
    for addr in addrs {
        let (list, ip) = match addr.ip() {
            IpAddr::V4(ip) => (&mut resolution.ipv4, ip.to_string()),
            IpAddr::V6(ip) => (&mut resolution.ipv6, ip.to_string()),
        };
        if !list.contains(&ip) {
            list.push(ip);
        }
    }
    Ok(resolution)
}
