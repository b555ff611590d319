//! Parsers for the route table formats shared by the gateway and routes
//! adapters: `ip -j route`, `ip route`, BSD `netstat -rn` and the Linux
//! kernel tables under `/proc/net`.

use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::debug;

use crate::domain::records::IpFamily;
use crate::error::NetError;

/// One route as a source reports it, before classification. The family comes
/// from the query or table section, never from the destination text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRoute {
    pub family: IpFamily,
    pub destination: String,
    pub gateway: String,
    pub interface: String,
    pub metric: u32,
    pub protocol: Option<String>,
}

impl RawRoute {
    pub fn is_default(&self) -> bool {
        matches!(self.destination.as_str(), "default" | "0.0.0.0/0" | "::/0")
    }
}

/// Next hops meaning "directly connected" become the empty string.
pub fn normalize_gateway(gateway: &str) -> String {
    match gateway {
        "0.0.0.0" | "::" => String::new(),
        g if g.starts_with("link#") => String::new(),
        g => g.to_string(),
    }
}

pub fn family_flag(family: IpFamily) -> &'static str {
    match family {
        IpFamily::V4 => "-4",
        IpFamily::V6 => "-6",
    }
}

// ── ip -j route ────────────────────────────────────────────

pub fn parse_ip_json(output: &str, family: IpFamily) -> Result<Vec<RawRoute>, NetError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Vec<serde_json::Value> =
        serde_json::from_str(trimmed).map_err(|e| NetError::parse("ip -j route output", e))?;

    Ok(parsed
        .iter()
        .map(|route| RawRoute {
            family,
            destination: route
                .get("dst")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            gateway: normalize_gateway(
                route.get("gateway").and_then(|v| v.as_str()).unwrap_or(""),
            ),
            interface: route
                .get("dev")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            metric: route
                .get("metric")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(0),
            protocol: route
                .get("protocol")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
        .collect())
}

// ── ip route (text) ────────────────────────────────────────

const ROUTE_TYPE_TOKENS: &[&str] = &[
    "unicast",
    "local",
    "broadcast",
    "multicast",
    "unreachable",
    "blackhole",
    "prohibit",
    "throw",
    "nat",
    "anycast",
];

/// Parse `ip route show` lines such as
/// `192.168.1.0/24 via 192.168.1.1 dev wlan0 proto dhcp metric 600`.
pub fn parse_ip_text(output: &str, family: IpFamily) -> Vec<RawRoute> {
    output
        .lines()
        .filter_map(|line| parse_ip_text_line(line, family))
        .collect()
}

fn parse_ip_text_line(line: &str, family: IpFamily) -> Option<RawRoute> {
    let mut parts: Vec<&str> = line.split_whitespace().collect();
    if parts.first().is_some_and(|t| ROUTE_TYPE_TOKENS.contains(t)) {
        parts.remove(0);
    }
    if parts.len() < 2 {
        return None;
    }

    let value_after = |marker: &str| {
        parts
            .windows(2)
            .find(|w| w[0] == marker)
            .map(|w| w[1])
    };

    Some(RawRoute {
        family,
        destination: parts[0].to_string(),
        gateway: value_after("via").map(normalize_gateway).unwrap_or_default(),
        interface: value_after("dev").unwrap_or("").to_string(),
        metric: value_after("metric").and_then(|m| m.parse().ok()).unwrap_or(0),
        protocol: value_after("proto").map(|p| p.to_string()),
    })
}

// ── netstat -rn (BSD/macOS) ────────────────────────────────

/// Parse the `Internet:` and `Internet6:` sections of `netstat -rn`.
/// Columns: Destination Gateway Flags Netif [Expire].
pub fn parse_netstat(output: &str) -> Vec<RawRoute> {
    let mut routes = Vec::new();
    let mut section = None;

    for line in output.lines() {
        if line.starts_with("Internet:") {
            section = Some(IpFamily::V4);
            continue;
        }
        if line.starts_with("Internet6:") {
            section = Some(IpFamily::V6);
            continue;
        }
        if line.starts_with("Routing tables") {
            section = None;
            continue;
        }
        let Some(family) = section else { continue };
        if line.starts_with("Destination") {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 4 {
            // S marks a manually added route
            let protocol = if parts[2].contains('S') { "static" } else { "kernel" };
            let destination = match family {
                IpFamily::V4 => expand_bsd_destination(parts[0]),
                IpFamily::V6 => parts[0].to_string(),
            };
            routes.push(RawRoute {
                family,
                destination,
                gateway: normalize_gateway(parts[1]),
                interface: parts[3].to_string(),
                metric: 0,
                protocol: Some(protocol.to_string()),
            });
        }
    }
    routes
}

/// BSD netstat abbreviates IPv4 networks: `127` is 127.0.0.0/8 and
/// `224.0.0/4` is 224.0.0.0/4. Full dotted quads and `default` pass through.
fn expand_bsd_destination(destination: &str) -> String {
    let (address, prefix) = match destination.split_once('/') {
        Some((a, p)) => (a, Some(p)),
        None => (destination, None),
    };
    let mut octets: Vec<&str> = address.split('.').collect();
    let given = octets.len();
    if given >= 4 || !octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        return destination.to_string();
    }
    octets.resize(4, "0");
    match prefix {
        Some(len) => format!("{}/{}", octets.join("."), len),
        None => format!("{}/{}", octets.join("."), 8 * given),
    }
}

// ── /proc/net/route, /proc/net/ipv6_route ──────────────────

const RTF_UP: u32 = 0x0001;
const RTF_GATEWAY: u32 = 0x0002;

/// A row of the kernel route tables with addresses already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelRoute {
    pub family: IpFamily,
    pub destination: String,
    pub prefix_len: u8,
    pub gateway: String,
    pub interface: String,
    pub metric: u32,
}

impl KernelRoute {
    /// The all-zero prefix with a real next hop.
    pub fn is_default_gateway(&self) -> bool {
        self.prefix_len == 0 && !self.gateway.is_empty()
    }

    pub fn into_raw(self) -> RawRoute {
        RawRoute {
            family: self.family,
            destination: format!("{}/{}", self.destination, self.prefix_len),
            gateway: self.gateway,
            interface: self.interface,
            metric: self.metric,
            protocol: Some("kernel".to_string()),
        }
    }
}

/// `/proc/net/route`: whitespace separated, addresses as little-endian hex.
/// Rows that do not decode are skipped.
pub fn parse_proc_ipv4(content: &str) -> Vec<KernelRoute> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| match parse_proc_ipv4_row(line) {
            Ok(route) => route,
            Err(e) => {
                debug!(row = line, error = %e, "skipping kernel route row");
                None
            }
        })
        .collect()
}

fn parse_proc_ipv4_row(line: &str) -> Result<Option<KernelRoute>, NetError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return Ok(None);
    }
    let flags = hex_u32(parts[3])?;
    if flags & RTF_UP == 0 {
        return Ok(None);
    }
    let destination = le_hex_ipv4(parts[1])?;
    let gateway = le_hex_ipv4(parts[2])?;
    let mask = hex_u32(parts[7])?;

    Ok(Some(KernelRoute {
        family: IpFamily::V4,
        destination: destination.to_string(),
        prefix_len: mask.count_ones() as u8,
        gateway: if flags & RTF_GATEWAY != 0 {
            normalize_gateway(&gateway.to_string())
        } else {
            String::new()
        },
        interface: parts[0].to_string(),
        metric: parts[6].parse().unwrap_or(0),
    }))
}

/// `/proc/net/ipv6_route`: dest, dest prefix, src, src prefix, next hop,
/// metric, refcnt, use, flags, interface. Hex, network byte order.
pub fn parse_proc_ipv6(content: &str) -> Vec<KernelRoute> {
    content
        .lines()
        .filter_map(|line| match parse_proc_ipv6_row(line) {
            Ok(route) => route,
            Err(e) => {
                debug!(row = line, error = %e, "skipping kernel route row");
                None
            }
        })
        .collect()
}

fn parse_proc_ipv6_row(line: &str) -> Result<Option<KernelRoute>, NetError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 10 {
        return Ok(None);
    }
    let flags = hex_u32(parts[8])?;
    if flags & RTF_UP == 0 {
        return Ok(None);
    }
    let destination = hex_ipv6(parts[0])?;
    let prefix_len =
        u8::from_str_radix(parts[1], 16).map_err(|e| NetError::parse("ipv6 route prefix", e))?;
    let next_hop = hex_ipv6(parts[4])?;

    Ok(Some(KernelRoute {
        family: IpFamily::V6,
        destination: destination.to_string(),
        prefix_len,
        gateway: normalize_gateway(&next_hop.to_string()),
        interface: parts[9].to_string(),
        metric: hex_u32(parts[5])?,
    }))
}

fn hex_u32(field: &str) -> Result<u32, NetError> {
    u32::from_str_radix(field, 16).map_err(|e| NetError::parse("kernel route field", e))
}

fn le_hex_ipv4(field: &str) -> Result<Ipv4Addr, NetError> {
    Ok(Ipv4Addr::from(hex_u32(field)?.to_le_bytes()))
}

fn hex_ipv6(field: &str) -> Result<Ipv6Addr, NetError> {
    u128::from_str_radix(field, 16)
        .map(Ipv6Addr::from)
        .map_err(|e| NetError::parse("kernel ipv6 address", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_json_routes() {
        let json = r#"[
            {"dst":"default","gateway":"192.168.1.1","dev":"wlan0","protocol":"dhcp","metric":600,"flags":[]},
            {"dst":"192.168.1.0/24","dev":"wlan0","protocol":"kernel","scope":"link","prefsrc":"192.168.1.42","flags":[]}
        ]"#;
        let routes = parse_ip_json(json, IpFamily::V4).unwrap();
        assert_eq!(routes.len(), 2);
        assert!(routes[0].is_default());
        assert_eq!(routes[0].gateway, "192.168.1.1");
        assert_eq!(routes[0].metric, 600);
        assert_eq!(routes[1].gateway, "");
        assert_eq!(routes[1].protocol.as_deref(), Some("kernel"));
        assert!(parse_ip_json("not json", IpFamily::V4).is_err());
    }

    #[test]
    fn ip_text_routes_use_markers() {
        let out = "default via 10.0.0.1 dev eth0 proto static metric 100\n\
                   unreachable 10.9.0.0/16 metric 5\n\
                   10.0.0.0/24 dev eth0 scope link src 10.0.0.5\n";
        let routes = parse_ip_text(out, IpFamily::V4);
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].destination, "default");
        assert_eq!(routes[0].interface, "eth0");
        assert_eq!(routes[1].destination, "10.9.0.0/16");
        assert_eq!(routes[1].metric, 5);
        assert_eq!(routes[2].protocol, None);
    }

    #[test]
    fn netstat_sections() {
        let out = "Routing tables\n\nInternet:\n\
            Destination        Gateway            Flags               Netif Expire\n\
            default            192.168.1.1        UGScg                 en0       \n\
            127                127.0.0.1          UCS                   lo0       \n\
            192.168.1          link#6             UCS                   en0      !\n\
            \nInternet6:\n\
            Destination                             Gateway                                 Flags               Netif Expire\n\
            default                                 fe80::1%en0                             UGcg                  en0       \n";
        let routes = parse_netstat(out);
        assert_eq!(routes.len(), 4);
        assert_eq!(routes[0].family, IpFamily::V4);
        assert_eq!(routes[0].gateway, "192.168.1.1");
        assert_eq!(routes[1].destination, "127.0.0.0/8");
        assert_eq!(routes[2].destination, "192.168.1.0/24");
        assert_eq!(routes[3].family, IpFamily::V6);
        assert_eq!(routes[3].destination, "default");
        assert_eq!(routes[0].interface, "en0");
        assert_eq!(routes[0].protocol.as_deref(), Some("static"));
        assert_eq!(routes[2].gateway, "");
        assert_eq!(routes[3].protocol.as_deref(), Some("kernel"));
        assert_eq!(routes[3].gateway, "fe80::1%en0");
    }

    #[test]
    fn proc_ipv4_decodes_little_endian() {
        let content = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
            eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0\n\
            eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0\n\
            eth1\t0002A8C0\t00000000\t0000\t0\t0\t0\t00FFFFFF\t0\t0\t0\n";
        let routes = parse_proc_ipv4(content);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].gateway, "192.168.1.1");
        assert!(routes[0].is_default_gateway());
        assert_eq!(routes[1].destination, "192.168.1.0");
        assert_eq!(routes[1].prefix_len, 24);
        assert_eq!(routes[1].gateway, "");
        assert_eq!(routes[1].clone().into_raw().destination, "192.168.1.0/24");
    }

    #[test]
    fn proc_ipv6_default_has_next_hop() {
        let content = "00000000000000000000000000000000 00 00000000000000000000000000000000 00 fe800000000000000000000000000001 00000400 00000001 00000000 00000003     eth0\n\
            fe800000000000000000000000000000 40 00000000000000000000000000000000 00 00000000000000000000000000000000 00000100 00000001 00000000 00000001     eth0\n";
        let routes = parse_proc_ipv6(content);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].gateway, "fe80::1");
        assert_eq!(routes[0].metric, 1024);
        assert!(routes[0].is_default_gateway());
        assert_eq!(routes[1].destination, "fe80::");
        assert_eq!(routes[1].prefix_len, 64);
        assert!(!routes[1].is_default_gateway());
    }

    #[test]
    fn bsd_destinations_expand_to_cidr() {
        assert_eq!(expand_bsd_destination("127"), "127.0.0.0/8");
        assert_eq!(expand_bsd_destination("169.254"), "169.254.0.0/16");
        assert_eq!(expand_bsd_destination("224.0.0/4"), "224.0.0.0/4");
        assert_eq!(expand_bsd_destination("192.168.1.7"), "192.168.1.7");
        assert_eq!(expand_bsd_destination("255.255.255.255/32"), "255.255.255.255/32");
        assert_eq!(expand_bsd_destination("default"), "default");
    }

    #[test]
    fn malformed_kernel_rows_are_skipped() {
        let v4 = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
            eth0\tZZZZZZZZ\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0\n\
            eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0\n";
        let routes = parse_proc_ipv4(v4);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].destination, "192.168.1.0");

        let v6 = "not-hex 40 00000000000000000000000000000000 00 00000000000000000000000000000000 00000100 00000001 00000000 00000001 eth0\n\
            fe800000000000000000000000000000 40 00000000000000000000000000000000 00 00000000000000000000000000000000 00000100 00000001 00000000 00000001 eth0\n";
        let routes = parse_proc_ipv6(v6);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].destination, "fe80::");
    }
}
