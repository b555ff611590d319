use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::fallback::{first_non_empty, Tier};
use super::powershell;
use super::records::{IpFamily, RouteRecord, RouteSummary, RouteType};
use super::route_table::{self, family_flag, RawRoute};
use super::runner::CommandRunner;
use crate::error::NetError;
use crate::platform::Os;

const FAMILIES: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

const WINDOWS_ROUTES_SCRIPT: &str = "Get-NetRoute | Select-Object DestinationPrefix, NextHop, InterfaceAlias, RouteMetric, Protocol | ConvertTo-Json";

/// Route type from the destination string alone.
pub fn classify(destination: &str) -> RouteType {
    match destination {
        "0.0.0.0/0" | "::/0" | "default" => RouteType::Default,
        d if d.contains('/') => RouteType::Network,
        _ => RouteType::Host,
    }
}

pub struct RoutesAdapter {
    tiers: Vec<Box<dyn Tier<RouteRecord>>>,
}

impl RoutesAdapter {
    pub fn for_os(os: Os, timeout: Duration, v4_table: PathBuf, v6_table: PathBuf) -> Self {
        let tiers: Vec<Box<dyn Tier<RouteRecord>>> = match os {
            Os::Linux => vec![
                Box::new(IpJsonRoutes { timeout }),
                Box::new(IpTextRoutes { timeout }),
                Box::new(KernelRoutes { v4_table, v6_table }),
            ],
            Os::MacOS => vec![Box::new(NetstatRoutes { timeout })],
            Os::Windows => vec![Box::new(PowerShellRoutes { timeout })],
        };
        Self { tiers }
    }

    /// The full routing table, sorted. Never an empty success.
    pub async fn routes(&self, runner: &dyn CommandRunner) -> Result<Vec<RouteRecord>, NetError> {
        let mut routes = first_non_empty("routes", &self.tiers, runner).await;
        if routes.is_empty() {
            return Err(NetError::NoRoutesFound);
        }
        sort_routes(&mut routes);
        Ok(routes)
    }

    pub async fn routes_by_interface(
        &self,
        runner: &dyn CommandRunner,
        interface: &str,
    ) -> Result<Vec<RouteRecord>, NetError> {
        Ok(self
            .routes(runner)
            .await?
            .into_iter()
            .filter(|r| r.interface == interface)
            .collect())
    }

    pub async fn default_routes(
        &self,
        runner: &dyn CommandRunner,
    ) -> Result<Vec<RouteRecord>, NetError> {
        Ok(self
            .routes(runner)
            .await?
            .into_iter()
            .filter(|r| r.route_type == RouteType::Default)
            .collect())
    }
}

pub fn summarize(routes: &[RouteRecord]) -> RouteSummary {
    let mut summary = RouteSummary {
        total: routes.len(),
        ..Default::default()
    };
    for route in routes {
        *summary
            .by_type
            .entry(route.route_type.to_string())
            .or_default() += 1;
        *summary
            .by_protocol
            .entry(route.protocol.clone())
            .or_default() += 1;
        *summary
            .by_interface
            .entry(route.interface.clone())
            .or_default() += 1;
    }
    summary
}

fn to_record(raw: RawRoute, source: &'static str, default_protocol: &str) -> Option<RouteRecord> {
    if raw.destination.is_empty() {
        return None;
    }
    Some(RouteRecord {
        family: raw.family,
        route_type: classify(&raw.destination),
        destination: raw.destination,
        gateway: raw.gateway,
        interface: raw.interface,
        metric: raw.metric,
        protocol: raw
            .protocol
            .unwrap_or_else(|| default_protocol.to_string()),
        source,
    })
}

// ── Ordering ───────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Cidr {
        family: IpFamily,
        address: u128,
        prefix_len: u8,
    },
    Opaque(String),
}

fn sort_key(route: &RouteRecord) -> SortKey {
    let destination = route.destination.as_str();
    if destination == "default" {
        return SortKey::Cidr {
            family: route.family,
            address: 0,
            prefix_len: 0,
        };
    }

    let (address, prefix) = match destination.split_once('/') {
        Some((a, p)) => (a, Some(p)),
        None => (destination, None),
    };
    // drop a zone suffix such as fe80::%lo0
    let address = address.split('%').next().unwrap_or(address);

    match address.parse::<IpAddr>() {
        Ok(ip) => {
            let (family, value, full) = match ip {
                IpAddr::V4(v4) => (IpFamily::V4, u32::from(v4) as u128, 32),
                IpAddr::V6(v6) => (IpFamily::V6, u128::from(v6), 128),
            };
            match prefix.map(str::parse::<u8>) {
                None => SortKey::Cidr {
                    family,
                    address: value,
                    prefix_len: full,
                },
                Some(Ok(len)) => SortKey::Cidr {
                    family,
                    address: value,
                    prefix_len: len,
                },
                Some(Err(_)) => SortKey::Opaque(destination.to_string()),
            }
        }
        Err(_) => SortKey::Opaque(destination.to_string()),
    }
}

/// Family first (IPv4 before IPv6), then numeric network address, then
/// prefix length. Destinations that are not addresses go last.
pub fn sort_routes(routes: &mut [RouteRecord]) {
    routes.sort_by_cached_key(sort_key);
}

// ── Linux ──────────────────────────────────────────────────

struct IpJsonRoutes {
    timeout: Duration,
}

#[async_trait]
impl Tier<RouteRecord> for IpJsonRoutes {
    fn source(&self) -> &'static str {
        "ip -j route"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<RouteRecord>, NetError> {
        let mut records = Vec::new();
        for family in FAMILIES {
            let args = [family_flag(family), "-j", "route", "show"];
            let parsed = match runner.run("ip", &args, self.timeout).await {
                Ok(out) => route_table::parse_ip_json(&out, family),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(routes) => records.extend(
                    routes
                        .into_iter()
                        .filter_map(|r| to_record(r, self.source(), "")),
                ),
                Err(e) => debug!(%family, error = %e, "ip -j route query failed"),
            }
        }
        Ok(records)
    }
}

struct IpTextRoutes {
    timeout: Duration,
}

#[async_trait]
impl Tier<RouteRecord> for IpTextRoutes {
    fn source(&self) -> &'static str {
        "ip route"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<RouteRecord>, NetError> {
        let mut records = Vec::new();
        for family in FAMILIES {
            let args = [family_flag(family), "route", "show"];
            match runner.run("ip", &args, self.timeout).await {
                Ok(out) => records.extend(
                    route_table::parse_ip_text(&out, family)
                        .into_iter()
                        .filter_map(|r| to_record(r, self.source(), "static")),
                ),
                Err(e) => debug!(%family, error = %e, "ip route query failed"),
            }
        }
        Ok(records)
    }
}

struct KernelRoutes {
    v4_table: PathBuf,
    v6_table: PathBuf,
}

#[async_trait]
impl Tier<RouteRecord> for KernelRoutes {
    fn source(&self) -> &'static str {
        "/proc/net/route"
    }

    async fn acquire(&self, _runner: &dyn CommandRunner) -> Result<Vec<RouteRecord>, NetError> {
        let v4 = tokio::fs::read_to_string(&self.v4_table)
            .await
            .map_err(|e| NetError::Io {
                path: self.v4_table.clone(),
                source: e,
            })?;
        let mut rows = route_table::parse_proc_ipv4(&v4);

        match tokio::fs::read_to_string(&self.v6_table).await {
            Ok(v6) => rows.extend(route_table::parse_proc_ipv6(&v6)),
            Err(e) => debug!(path = %self.v6_table.display(), error = %e, "no IPv6 route table"),
        }

        Ok(rows
            .into_iter()
            .filter_map(|r| to_record(r.into_raw(), self.source(), "kernel"))
            .collect())
    }
}

// ── macOS ──────────────────────────────────────────────────

struct NetstatRoutes {
    timeout: Duration,
}

#[async_trait]
impl Tier<RouteRecord> for NetstatRoutes {
    fn source(&self) -> &'static str {
        "netstat -rn"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<RouteRecord>, NetError> {
        let out = runner.run("netstat", &["-rn"], self.timeout).await?;
        Ok(route_table::parse_netstat(&out)
            .into_iter()
            .filter_map(|r| to_record(r, self.source(), ""))
            .collect())
    }
}

// ── Windows ────────────────────────────────────────────────

struct PowerShellRoutes {
    timeout: Duration,
}

/// `ConvertTo-Json` renders the NetRoute protocol enum as its numeric value.
fn windows_protocol(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(1) => "Other",
            Some(2) => "Local",
            Some(3) => "NetMgmt",
            Some(4) => "Icmp",
            Some(8) => "Rip",
            Some(13) => "Ospf",
            Some(14) => "Bgp",
            Some(16) => "Eigrp",
            Some(19) => "Dhcp",
            _ => return n.to_string(),
        }
        .to_string(),
        _ => String::new(),
    }
}

#[async_trait]
impl Tier<RouteRecord> for PowerShellRoutes {
    fn source(&self) -> &'static str {
        "PowerShell"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<RouteRecord>, NetError> {
        let objects = powershell::query(
            runner,
            WINDOWS_ROUTES_SCRIPT,
            self.timeout,
            "Get-NetRoute output",
        )
        .await?;
        Ok(objects
            .iter()
            .filter_map(|o| {
                let destination = powershell::str_field(o, "DestinationPrefix");
                to_record(
                    RawRoute {
                        family: if destination.contains(':') {
                            IpFamily::V6
                        } else {
                            IpFamily::V4
                        },
                        destination: destination.to_string(),
                        gateway: route_table::normalize_gateway(powershell::str_field(
                            o, "NextHop",
                        )),
                        interface: powershell::str_field(o, "InterfaceAlias").to_string(),
                        metric: powershell::u32_field(o, "RouteMetric"),
                        protocol: Some(windows_protocol(o.get("Protocol"))),
                    },
                    self.source(),
                    "",
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runner::testing::ScriptedRunner;

    const SECS: Duration = Duration::from_secs(5);

    fn route(family: IpFamily, destination: &str, gateway: &str) -> RouteRecord {
        RouteRecord {
            family,
            destination: destination.into(),
            gateway: gateway.into(),
            interface: "eth0".into(),
            metric: 0,
            protocol: "static".into(),
            route_type: classify(destination),
            source: "test",
        }
    }

    #[test]
    fn classification_is_by_destination_only() {
        assert_eq!(classify("0.0.0.0/0"), RouteType::Default);
        assert_eq!(classify("::/0"), RouteType::Default);
        assert_eq!(classify("default"), RouteType::Default);
        assert_eq!(classify("10.0.0.0/8"), RouteType::Network);
        assert_eq!(classify("10.0.0.1"), RouteType::Host);
        assert_eq!(classify("fe80::1"), RouteType::Host);
    }

    #[test]
    fn cidr_aware_ordering() {
        use IpFamily::{V4, V6};
        let mut routes = vec![
            route(V6, "fe80::/64", ""),
            route(V4, "bogus", ""),
            route(V4, "192.168.1.0/24", ""),
            route(V4, "10.0.0.0/24", ""),
            route(V6, "default", "fe80::1"),
            route(V4, "10.0.0.0/8", ""),
            route(V4, "9.9.9.9", ""),
            route(V4, "default", "10.0.0.1"),
        ];
        sort_routes(&mut routes);
        let order: Vec<_> = routes
            .iter()
            .map(|r| format!("{}|{}", r.destination, r.gateway))
            .collect();
        assert_eq!(
            order,
            vec![
                "default|10.0.0.1",
                "9.9.9.9|",
                "10.0.0.0/8|",
                "10.0.0.0/24|",
                "192.168.1.0/24|",
                "default|fe80::1",
                "fe80::/64|",
                "bogus|",
            ]
        );
    }

    #[tokio::test]
    async fn text_tier_defaults_protocol_to_static() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok(
                "ip -4 route show",
                "default via 10.0.0.1 dev eth0 metric 100\n\
                 10.0.0.0/24 dev eth0 proto kernel scope link src 10.0.0.5\n",
            )
            .ok("ip -6 route show", "::1 dev lo proto kernel metric 256 pref medium\n");
        let adapter = RoutesAdapter::for_os(
            Os::Linux,
            SECS,
            dir.path().join("route"),
            dir.path().join("ipv6_route"),
        );
        let routes = adapter.routes(&runner).await.unwrap();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].destination, "default");
        assert_eq!(routes[0].protocol, "static");
        assert_eq!(routes[0].route_type, RouteType::Default);
        assert_eq!(routes[1].protocol, "kernel");
        assert_eq!(routes[2].route_type, RouteType::Host);
        assert!(routes.iter().all(|r| r.source == "ip route"));

        let summary = summarize(&routes);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_type.get("Default"), Some(&1));
        assert_eq!(summary.by_protocol.get("kernel"), Some(&2));
        assert_eq!(summary.by_interface.get("eth0"), Some(&2));
    }

    #[tokio::test]
    async fn json_tier_skips_empty_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().ok(
            "ip -4 -j route show",
            r#"[{"dst":"","dev":"eth0"},{"dst":"default","gateway":"10.0.0.1","dev":"eth0","protocol":"dhcp"},
                {"dst":"172.17.0.0/16","dev":"docker0","protocol":"kernel"}]"#,
        );
        let adapter = RoutesAdapter::for_os(
            Os::Linux,
            SECS,
            dir.path().join("route"),
            dir.path().join("ipv6_route"),
        );
        let routes = adapter.routes(&runner).await.unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].protocol, "dhcp");

        let docker = adapter.routes_by_interface(&runner, "docker0").await.unwrap();
        assert_eq!(docker.len(), 1);
        let defaults = adapter.default_routes(&runner).await.unwrap();
        assert_eq!(defaults.len(), 1);
    }

    #[tokio::test]
    async fn ipv6_default_without_next_hop_sorts_with_ipv6() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok("ip -4 route show", "10.0.0.0/24 dev eth0 proto kernel scope link\n")
            .ok("ip -6 route show", "::1 dev lo proto kernel metric 256\ndefault dev wg0 metric 1024\n");
        let adapter = RoutesAdapter::for_os(
            Os::Linux,
            SECS,
            dir.path().join("route"),
            dir.path().join("ipv6_route"),
        );
        let routes = adapter.routes(&runner).await.unwrap();
        let order: Vec<_> = routes.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(order, vec!["10.0.0.0/24", "default", "::1"]);
        assert_eq!(routes[1].family, IpFamily::V6);
    }

    #[tokio::test]
    async fn macos_networks_sort_before_ipv6() {
        let runner = ScriptedRunner::new().ok(
            "netstat -rn",
            "Routing tables\n\nInternet:\n\
             Destination        Gateway            Flags        Netif Expire\n\
             default            192.168.1.1        UGScg          en0\n\
             224.0.0/4          link#6             UmCS           en0      !\n\
             192.168.1          link#6             UCS            en0      !\n\
             127                127.0.0.1          UCS            lo0\n\
             \nInternet6:\n\
             Destination        Gateway            Flags        Netif Expire\n\
             default            fe80::1%en0        UGcg           en0\n\
             ::1                ::1                UHL            lo0\n\
             fe80::%lo0/64      fe80::1%lo0        UcI            lo0\n",
        );
        let adapter = RoutesAdapter::for_os(Os::MacOS, SECS, PathBuf::new(), PathBuf::new());
        let routes = adapter.routes(&runner).await.unwrap();
        let order: Vec<_> = routes.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "default",
                "127.0.0.0/8",
                "192.168.1.0/24",
                "224.0.0.0/4",
                "default",
                "::1",
                "fe80::%lo0/64",
            ]
        );
        assert_eq!(routes[0].family, IpFamily::V4);
        assert_eq!(routes[4].family, IpFamily::V6);
        assert_eq!(routes[1].route_type, RouteType::Network);
        assert_eq!(routes[2].route_type, RouteType::Network);
        assert_eq!(routes[5].route_type, RouteType::Host);
    }

    #[tokio::test]
    async fn exhausted_tiers_are_no_routes_found() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let adapter = RoutesAdapter::for_os(
            Os::Linux,
            SECS,
            dir.path().join("route"),
            dir.path().join("ipv6_route"),
        );
        let err = adapter.routes(&runner).await.unwrap_err();
        assert!(matches!(err, NetError::NoRoutesFound));
    }

    #[tokio::test]
    async fn windows_protocol_numbers_are_named() {
        let runner = ScriptedRunner::new().ok(
            &format!(
                "powershell -NoProfile -NonInteractive -Command {}",
                WINDOWS_ROUTES_SCRIPT
            ),
            r#"[{"DestinationPrefix":"0.0.0.0/0","NextHop":"192.168.0.1","InterfaceAlias":"Wi-Fi","RouteMetric":0,"Protocol":3},
                {"DestinationPrefix":"192.168.0.0/24","NextHop":"0.0.0.0","InterfaceAlias":"Wi-Fi","RouteMetric":256,"Protocol":2}]"#,
        );
        let adapter = RoutesAdapter::for_os(Os::Windows, SECS, PathBuf::new(), PathBuf::new());
        let routes = adapter.routes(&runner).await.unwrap();
        assert_eq!(routes[0].protocol, "NetMgmt");
        assert_eq!(routes[0].route_type, RouteType::Default);
        assert_eq!(routes[1].gateway, "");
        assert_eq!(routes[1].protocol, "Local");
    }
}
