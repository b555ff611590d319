use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use super::powershell;
use super::records::{InterfaceRecord, LocalAddresses};
use super::runner::CommandRunner;
use crate::error::NetError;
use crate::platform::Os;

const WINDOWS_ADAPTER_SCRIPT: &str =
    "Get-NetAdapter | Select-Object Name, InterfaceIndex, MtuSize, MacAddress, Status | ConvertTo-Json";
const WINDOWS_ADDRESS_SCRIPT: &str =
    "Get-NetIPAddress | Select-Object InterfaceIndex, IPAddress, PrefixLength | ConvertTo-Json";

pub enum InterfacesAdapter {
    /// `ip -j addr`
    IpJson { timeout: Duration },
    /// `ifconfig` text blocks
    Ifconfig { timeout: Duration },
    /// `Get-NetAdapter` joined with `Get-NetIPAddress`
    PowerShell { timeout: Duration },
}

impl InterfacesAdapter {
    pub fn for_os(os: Os, timeout: Duration) -> Self {
        match os {
            Os::Linux => InterfacesAdapter::IpJson { timeout },
            Os::MacOS => InterfacesAdapter::Ifconfig { timeout },
            Os::Windows => InterfacesAdapter::PowerShell { timeout },
        }
    }

    pub async fn interfaces(
        &self,
        runner: &dyn CommandRunner,
    ) -> Result<Vec<InterfaceRecord>, NetError> {
        match self {
            InterfacesAdapter::IpJson { timeout } => {
                let out = runner.run("ip", &["-j", "addr"], *timeout).await?;
                parse_ip_addr(&out)
            }
            InterfacesAdapter::Ifconfig { timeout } => {
                let out = runner.run("ifconfig", &[], *timeout).await?;
                Ok(parse_ifconfig(&out))
            }
            InterfacesAdapter::PowerShell { timeout } => {
                let adapters =
                    powershell::query(runner, WINDOWS_ADAPTER_SCRIPT, *timeout, "Get-NetAdapter output")
                        .await?;
                let addresses = powershell::query(
                    runner,
                    WINDOWS_ADDRESS_SCRIPT,
                    *timeout,
                    "Get-NetIPAddress output",
                )
                .await?;
                Ok(join_windows(&adapters, &addresses))
            }
        }
    }

    pub async fn find_interface(
        &self,
        runner: &dyn CommandRunner,
        name: &str,
    ) -> Result<InterfaceRecord, NetError> {
        self.interfaces(runner)
            .await?
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| NetError::NotFound(format!("interface {}", name)))
    }

    /// Interfaces that are up and carry at least one address.
    pub async fn active_interfaces(
        &self,
        runner: &dyn CommandRunner,
    ) -> Result<Vec<InterfaceRecord>, NetError> {
        let mut interfaces = self.interfaces(runner).await?;
        interfaces.retain(InterfaceRecord::is_active);
        Ok(interfaces)
    }
}

// ── Local addresses ──────────────────────────────────────────

/// Group the non-loopback addresses of every interface that is up. The
/// first address of each family becomes the representative one.
pub fn local_addresses(interfaces: &[InterfaceRecord]) -> Vec<LocalAddresses> {
    interfaces
        .iter()
        .filter(|i| i.is_active())
        .filter_map(|iface| {
            let addrs: Vec<IpAddr> = iface
                .addresses
                .iter()
                .filter_map(|a| strip_prefix(a).parse::<IpAddr>().ok())
                .filter(|ip| !ip.is_loopback())
                .collect();
            if addrs.is_empty() {
                return None;
            }
            Some(LocalAddresses {
                interface: iface.name.clone(),
                ipv4: addrs.iter().find(|ip| ip.is_ipv4()).map(IpAddr::to_string),
                ipv6: addrs.iter().find(|ip| ip.is_ipv6()).map(IpAddr::to_string),
                addresses: addrs.iter().map(IpAddr::to_string).collect(),
            })
        })
        .collect()
}

fn strip_prefix(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

fn with_prefix(address: &str, prefix: Option<u64>) -> String {
    match prefix {
        Some(p) => format!("{}/{}", address, p),
        None => address.to_string(),
    }
}

// ── Linux ────────────────────────────────────────────────────

pub fn parse_ip_addr(json: &str) -> Result<Vec<InterfaceRecord>, NetError> {
    let parsed: Vec<Value> =
        serde_json::from_str(json).map_err(|e| NetError::parse("ip -j addr output", e))?;

    Ok(parsed
        .iter()
        .filter_map(|iface| {
            let name = iface.get("ifname").and_then(|v| v.as_str())?.to_string();

            let flags = iface
                .get("flags")
                .and_then(|f| f.as_array())
                .map(|flags| {
                    flags
                        .iter()
                        .filter_map(|f| f.as_str())
                        .map(str::to_lowercase)
                        .collect()
                })
                .unwrap_or_default();

            let addresses = iface
                .get("addr_info")
                .and_then(|a| a.as_array())
                .map(|addrs| {
                    addrs
                        .iter()
                        .filter_map(|a| {
                            let local = a.get("local").and_then(|l| l.as_str())?;
                            let prefix = a.get("prefixlen").and_then(|p| p.as_u64());
                            Some(with_prefix(local, prefix))
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(InterfaceRecord {
                name,
                index: iface.get("ifindex").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                mtu: iface.get("mtu").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                hardware_addr: iface
                    .get("address")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                flags,
                addresses,
            })
        })
        .collect())
}

// ── macOS ────────────────────────────────────────────────────

/// Parse `ifconfig` output. Each block starts at an unindented
/// `name: flags=...<UP,...> mtu N` line.
pub fn parse_ifconfig(output: &str) -> Vec<InterfaceRecord> {
    let mut interfaces = Vec::new();
    let mut current: Option<InterfaceRecord> = None;

    for line in output.lines() {
        if !line.starts_with('\t') && !line.starts_with(' ') && line.contains(':') {
            interfaces.extend(current.take());
            let name = line.split(':').next().unwrap_or("").to_string();
            let flags = line
                .split_once('<')
                .and_then(|(_, rest)| rest.split_once('>'))
                .map(|(flags, _)| {
                    flags
                        .split(',')
                        .filter(|f| !f.is_empty())
                        .map(str::to_lowercase)
                        .collect()
                })
                .unwrap_or_default();
            let mtu = line
                .split("mtu ")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            current = Some(InterfaceRecord {
                name,
                index: 0,
                mtu,
                hardware_addr: String::new(),
                flags,
                addresses: Vec::new(),
            });
            continue;
        }

        let Some(iface) = current.as_mut() else {
            continue;
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["inet", addr, rest @ ..] => {
                let prefix = field_after(rest, "netmask").and_then(netmask_prefix);
                iface.addresses.push(with_prefix(addr, prefix));
            }
            ["inet6", addr, rest @ ..] => {
                let addr = addr.split('%').next().unwrap_or(*addr);
                let prefix = field_after(rest, "prefixlen").and_then(|p| p.parse().ok());
                iface.addresses.push(with_prefix(addr, prefix));
            }
            ["ether", mac, ..] => iface.hardware_addr = mac.to_string(),
            _ => {}
        }
    }

    interfaces.extend(current);
    interfaces
}

fn field_after<'a>(fields: &[&'a str], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .position(|f| *f == key)
        .and_then(|i| fields.get(i + 1))
        .copied()
}

/// `0xffffff00` → 24
fn netmask_prefix(mask: &str) -> Option<u64> {
    let hex = mask.strip_prefix("0x")?;
    u32::from_str_radix(hex, 16)
        .ok()
        .map(|m| u64::from(m.count_ones()))
}

// ── Windows ──────────────────────────────────────────────────

pub fn join_windows(adapters: &[Value], addresses: &[Value]) -> Vec<InterfaceRecord> {
    let mut by_index: HashMap<u32, Vec<String>> = HashMap::new();
    for entry in addresses {
        let ip = powershell::str_field(entry, "IPAddress");
        if ip.is_empty() {
            continue;
        }
        let prefix = entry.get("PrefixLength").and_then(|p| p.as_u64());
        by_index
            .entry(powershell::u32_field(entry, "InterfaceIndex"))
            .or_default()
            .push(with_prefix(ip.split('%').next().unwrap_or(ip), prefix));
    }

    adapters
        .iter()
        .filter_map(|entry| {
            let name = powershell::str_field(entry, "Name");
            if name.is_empty() {
                return None;
            }
            let index = powershell::u32_field(entry, "InterfaceIndex");
            let status = powershell::str_field(entry, "Status");
            Some(InterfaceRecord {
                name: name.to_string(),
                index,
                mtu: powershell::u32_field(entry, "MtuSize"),
                hardware_addr: powershell::str_field(entry, "MacAddress").to_string(),
                flags: if status.eq_ignore_ascii_case("up") {
                    vec!["up".to_string()]
                } else {
                    Vec::new()
                },
                addresses: by_index.remove(&index).unwrap_or_default(),
            })
        })
        .collect()
}
