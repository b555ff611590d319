//! Canonical records every acquisition strategy converges on.
//!
//! Records are plain values produced fresh on every query. Nothing here knows
//! which command, file or API produced it beyond the `source` provenance tag.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// ── Shared tags ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    #[serde(rename = "IPv4")]
    V4,
    #[serde(rename = "IPv6")]
    V6,
}

impl IpFamily {
    /// Family of an address string: IPv4 when it parses as a dotted quad,
    /// IPv6 otherwise.
    pub fn of(address: &str) -> Self {
        if address.parse::<std::net::Ipv4Addr>().is_ok() {
            IpFamily::V4
        } else {
            IpFamily::V6
        }
    }

    pub fn of_ip(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }
}

impl std::str::FromStr for IpFamily {
    type Err = crate::error::NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "4" | "v4" | "ipv4" | "inet" => Ok(IpFamily::V4),
            "6" | "v6" | "ipv6" | "inet6" => Ok(IpFamily::V6),
            other => Err(crate::error::NetError::Validation(format!(
                "unknown address family '{}' (expected v4 or v6)",
                other
            ))),
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "IPv4"),
            IpFamily::V6 => write!(f, "IPv6"),
        }
    }
}

// ── Interfaces ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    Up,
    Down,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Up => write!(f, "UP"),
            LinkStatus::Down => write!(f, "DOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceRecord {
    pub name: String,
    /// OS interface index; 0 when the source does not report one.
    pub index: u32,
    pub mtu: u32,
    pub hardware_addr: String,
    /// Lower-case flag names as reported by the source ("up", "broadcast", ...).
    pub flags: Vec<String>,
    pub addresses: Vec<String>,
}

impl InterfaceRecord {
    pub fn status(&self) -> LinkStatus {
        if self.flags.iter().any(|f| f == "up") {
            LinkStatus::Up
        } else {
            LinkStatus::Down
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == LinkStatus::Up && !self.addresses.is_empty()
    }
}

/// Non-loopback addresses of one interface that is up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalAddresses {
    pub interface: String,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub timezone: Option<String>,
}

// ── DNS ────────────────────────────────────────────────────

pub const SYSTEM_INTERFACE: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnsRecord {
    pub interface: String,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub all: Vec<String>,
}

impl DnsRecord {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            all: Vec::new(),
        }
    }

    /// Add a server, filing it under its family when it is a valid address.
    pub fn push_server(&mut self, server: &str) {
        self.all.push(server.to_string());
        match server.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => self.ipv4.push(server.to_string()),
            Ok(IpAddr::V6(_)) => self.ipv6.push(server.to_string()),
            Err(_) => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DnsConfig {
    pub servers: Vec<DnsRecord>,
    pub search_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    pub host: String,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
}

// ── Gateways ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayRecord {
    pub interface: String,
    pub gateway: String,
    pub family: IpFamily,
    pub metric: u32,
    pub source: &'static str,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewaySet {
    pub gateways: Vec<GatewayRecord>,
}

impl GatewaySet {
    pub fn default_for(&self, family: IpFamily) -> Option<&GatewayRecord> {
        self.gateways
            .iter()
            .find(|g| g.is_default && g.family == family)
    }
}

// ── Routes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RouteType {
    Default,
    Network,
    Host,
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteType::Default => write!(f, "Default"),
            RouteType::Network => write!(f, "Network"),
            RouteType::Host => write!(f, "Host"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRecord {
    pub family: IpFamily,
    pub destination: String,
    /// Empty when the route is on-link.
    pub gateway: String,
    pub interface: String,
    pub metric: u32,
    pub protocol: String,
    pub route_type: RouteType,
    pub source: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteSummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_protocol: BTreeMap<String, usize>,
    pub by_interface: BTreeMap<String, usize>,
}

// ── Connections ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
    Tcp6,
    Udp6,
}

impl Transport {
    pub fn is_tcp(self) -> bool {
        matches!(self, Transport::Tcp | Transport::Tcp6)
    }

    pub fn is_udp(self) -> bool {
        matches!(self, Transport::Udp | Transport::Udp6)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
            Transport::Tcp6 => "tcp6",
            Transport::Udp6 => "udp6",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub family: IpFamily,
    pub transport: Transport,
    pub local_addr: String,
    pub remote_addr: String,
    pub status: String,
    pub pid: u32,
    pub process: String,
}

impl ConnectionRecord {
    pub fn local_port(&self) -> Option<u16> {
        port_of(&self.local_addr)
    }

    pub fn remote_port(&self) -> Option<u16> {
        port_of(&self.remote_addr)
    }
}

fn port_of(addr: &str) -> Option<u16> {
    addr.rsplit_once(':').and_then(|(_, p)| p.parse().ok())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionTotals {
    pub total: usize,
    pub tcp: usize,
    pub udp: usize,
    pub listening: usize,
    pub established: usize,
}

impl ConnectionTotals {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a ConnectionRecord>) -> Self {
        let mut totals = Self::default();
        for r in records {
            totals.total += 1;
            if r.transport.is_tcp() {
                totals.tcp += 1;
            } else if r.transport.is_udp() {
                totals.udp += 1;
            }
            match r.status.as_str() {
                "LISTEN" => totals.listening += 1,
                "ESTABLISHED" => totals.established += 1,
                _ => {}
            }
        }
        totals
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionSet {
    pub connections: Vec<ConnectionRecord>,
    pub totals: ConnectionTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListeningPort {
    pub port: u16,
    pub transport: Transport,
    pub family: IpFamily,
    pub service: String,
    pub pid: u32,
    pub process: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessGroup {
    pub process: String,
    pub pid: u32,
    pub totals: ConnectionTotals,
}

// ── Ping ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PingRecord {
    pub host: String,
    pub success: bool,
    pub packet_loss: f64,
    pub min_rtt_ms: f64,
    pub avg_rtt_ms: f64,
    pub max_rtt_ms: f64,
    pub mdev_rtt_ms: f64,
    pub packets_sent: u32,
    pub packets_received: u32,
    pub raw_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
