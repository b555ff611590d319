//! Default gateway discovery.
//!
//! Tiers are tried in order until one produces a gateway. The first gateway
//! seen for each family becomes that family's default.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::fallback::{first_non_empty, Tier};
use super::powershell;
use super::records::{GatewayRecord, GatewaySet, IpFamily};
use super::route_table::{self, family_flag, KernelRoute, RawRoute};
use super::runner::CommandRunner;
use crate::error::NetError;
use crate::platform::Os;

const FAMILIES: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

pub struct GatewayAdapter {
    tiers: Vec<Box<dyn Tier<GatewayRecord>>>,
}

impl GatewayAdapter {
    pub fn for_os(os: Os, timeout: Duration, v4_table: PathBuf, v6_table: PathBuf) -> Self {
        let tiers: Vec<Box<dyn Tier<GatewayRecord>>> = match os {
            Os::Linux => vec![
                Box::new(IpJsonGateways { timeout }),
                Box::new(IpTextGateways { timeout }),
                Box::new(KernelGateways { v4_table, v6_table }),
            ],
            Os::MacOS => vec![Box::new(NetstatGateways { timeout })],
            Os::Windows => vec![Box::new(PowerShellGateways { timeout })],
        };
        Self { tiers }
    }

    pub async fn gateways(&self, runner: &dyn CommandRunner) -> Result<GatewaySet, NetError> {
        let found = first_non_empty("gateway", &self.tiers, runner).await;
        if found.is_empty() {
            return Err(NetError::NoGatewayFound { family: None });
        }
        Ok(GatewaySet {
            gateways: designate_defaults(found),
        })
    }

    pub async fn default_gateway(
        &self,
        runner: &dyn CommandRunner,
        family: IpFamily,
    ) -> Result<GatewayRecord, NetError> {
        let set = self.gateways(runner).await.map_err(|e| match e {
            NetError::NoGatewayFound { .. } => NetError::NoGatewayFound {
                family: Some(family),
            },
            other => other,
        })?;
        set.default_for(family)
            .cloned()
            .ok_or(NetError::NoGatewayFound {
                family: Some(family),
            })
    }
}

/// Mark the first record of each family as its default; clear the flag on the
/// rest.
pub fn designate_defaults(mut records: Vec<GatewayRecord>) -> Vec<GatewayRecord> {
    let mut seen_v4 = false;
    let mut seen_v6 = false;
    for record in &mut records {
        let seen = match record.family {
            IpFamily::V4 => &mut seen_v4,
            IpFamily::V6 => &mut seen_v6,
        };
        record.is_default = !*seen;
        *seen = true;
    }
    records
}

/// Turn a parsed default route into a gateway record. Routes without an
/// interface or next hop carry no gateway.
fn to_gateway(route: RawRoute, source: &'static str) -> Option<GatewayRecord> {
    if route.interface.is_empty() || route.gateway.is_empty() {
        return None;
    }
    Some(GatewayRecord {
        family: route.family,
        interface: route.interface,
        gateway: route.gateway,
        metric: route.metric,
        source,
        is_default: false,
    })
}

// ── Linux ──────────────────────────────────────────────────

struct IpJsonGateways {
    timeout: Duration,
}

#[async_trait]
impl Tier<GatewayRecord> for IpJsonGateways {
    fn source(&self) -> &'static str {
        "ip -j route"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<GatewayRecord>, NetError> {
        let mut records = Vec::new();
        for family in FAMILIES {
            let args = [family_flag(family), "-j", "route", "show", "default"];
            let parsed = match runner.run("ip", &args, self.timeout).await {
                Ok(out) => route_table::parse_ip_json(&out, family),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(routes) => records.extend(
                    routes
                        .into_iter()
                        .filter_map(|r| to_gateway(r, self.source())),
                ),
                Err(e) => debug!(%family, error = %e, "ip -j default route query failed"),
            }
        }
        Ok(records)
    }
}

struct IpTextGateways {
    timeout: Duration,
}

#[async_trait]
impl Tier<GatewayRecord> for IpTextGateways {
    fn source(&self) -> &'static str {
        "ip route"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<GatewayRecord>, NetError> {
        let mut records = Vec::new();
        for family in FAMILIES {
            let args = [family_flag(family), "route", "show", "default"];
            match runner.run("ip", &args, self.timeout).await {
                Ok(out) => records.extend(
                    out.lines()
                        .filter(|l| l.split_whitespace().next() == Some("default"))
                        .flat_map(|l| route_table::parse_ip_text(l, family))
                        .filter_map(|r| to_gateway(r, self.source())),
                ),
                Err(e) => debug!(%family, error = %e, "ip default route query failed"),
            }
        }
        Ok(records)
    }
}

type ParseTable = fn(&str) -> Vec<KernelRoute>;

struct KernelGateways {
    v4_table: PathBuf,
    v6_table: PathBuf,
}

#[async_trait]
impl Tier<GatewayRecord> for KernelGateways {
    fn source(&self) -> &'static str {
        "/proc/net/route"
    }

    async fn acquire(&self, _runner: &dyn CommandRunner) -> Result<Vec<GatewayRecord>, NetError> {
        let mut records = Vec::new();
        let tables = [
            (&self.v4_table, route_table::parse_proc_ipv4 as ParseTable),
            (&self.v6_table, route_table::parse_proc_ipv6),
        ];
        for (path, parse) in tables {
            let content = match tokio::fs::read_to_string(path).await {
                Ok(c) => c,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "kernel route table unreadable");
                    continue;
                }
            };
            records.extend(
                parse(&content)
                    .into_iter()
                    .filter(|r| r.is_default_gateway())
                    .map(|r| GatewayRecord {
                        family: r.family,
                        interface: r.interface,
                        gateway: r.gateway,
                        metric: r.metric,
                        source: self.source(),
                        is_default: false,
                    }),
            );
        }
        Ok(records)
    }
}

// ── macOS ──────────────────────────────────────────────────

struct NetstatGateways {
    timeout: Duration,
}

#[async_trait]
impl Tier<GatewayRecord> for NetstatGateways {
    fn source(&self) -> &'static str {
        "netstat -rn"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<GatewayRecord>, NetError> {
        let out = runner.run("netstat", &["-rn"], self.timeout).await?;
        Ok(route_table::parse_netstat(&out)
            .into_iter()
            .filter(|r| r.is_default())
            .filter_map(|r| to_gateway(r, self.source()))
            .collect())
    }
}

// ── Windows ────────────────────────────────────────────────

struct PowerShellGateways {
    timeout: Duration,
}

fn windows_gateway_script(family: IpFamily) -> String {
    let prefix = match family {
        IpFamily::V4 => "0.0.0.0/0",
        IpFamily::V6 => "::/0",
    };
    format!(
        "Get-NetRoute -DestinationPrefix \"{}\" | Select-Object InterfaceAlias, NextHop, RouteMetric | ConvertTo-Json",
        prefix
    )
}

#[async_trait]
impl Tier<GatewayRecord> for PowerShellGateways {
    fn source(&self) -> &'static str {
        "PowerShell"
    }

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<GatewayRecord>, NetError> {
        let mut records = Vec::new();
        for family in FAMILIES {
            let script = windows_gateway_script(family);
            match powershell::query(runner, &script, self.timeout, "Get-NetRoute output").await {
                Ok(objects) => records.extend(objects.iter().filter_map(|o| {
                    to_gateway(
                        RawRoute {
                            family,
                            destination: String::new(),
                            gateway: route_table::normalize_gateway(powershell::str_field(
                                o, "NextHop",
                            )),
                            interface: powershell::str_field(o, "InterfaceAlias").to_string(),
                            metric: powershell::u32_field(o, "RouteMetric"),
                            protocol: None,
                        },
                        self.source(),
                    )
                })),
                Err(e) => debug!(%family, error = %e, "PowerShell default route query failed"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runner::testing::ScriptedRunner;
    use std::io::Write;

    const SECS: Duration = Duration::from_secs(5);

    fn linux(dir: &std::path::Path) -> GatewayAdapter {
        GatewayAdapter::for_os(
            Os::Linux,
            SECS,
            dir.join("route"),
            dir.join("ipv6_route"),
        )
    }

    #[tokio::test]
    async fn json_tier_wins_and_first_per_family_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok(
                "ip -4 -j route show default",
                r#"[{"dst":"default","gateway":"10.0.0.1","dev":"eth0","metric":100},
                    {"dst":"default","gateway":"10.0.1.1","dev":"eth1","metric":50}]"#,
            )
            .ok(
                "ip -6 -j route show default",
                r#"[{"dst":"default","gateway":"fe80::1","dev":"eth0","metric":1024}]"#,
            );
        let set = linux(dir.path()).gateways(&runner).await.unwrap();
        assert_eq!(set.gateways.len(), 3);
        let defaults: Vec<_> = set.gateways.iter().filter(|g| g.is_default).collect();
        assert_eq!(defaults.len(), 2);
        assert_eq!(set.default_for(IpFamily::V4).unwrap().gateway, "10.0.0.1");
        assert_eq!(set.default_for(IpFamily::V6).unwrap().gateway, "fe80::1");
        assert!(set.gateways.iter().all(|g| g.source == "ip -j route"));
    }

    #[tokio::test]
    async fn falls_back_to_text_when_json_unparseable() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .ok("ip -4 -j route show default", "Option \"-j\" is unknown")
            .ok(
                "ip -4 route show default",
                "default via 192.168.1.1 dev wlan0 proto dhcp metric 600\n",
            )
            .ok("ip -6 route show default", "");
        let set = linux(dir.path()).gateways(&runner).await.unwrap();
        assert_eq!(set.gateways.len(), 1);
        let gw = &set.gateways[0];
        assert_eq!(gw.interface, "wlan0");
        assert_eq!(gw.metric, 600);
        assert_eq!(gw.source, "ip route");
        assert!(gw.is_default);
    }

    #[tokio::test]
    async fn text_tier_requires_default_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().ok(
            "ip -4 route show default",
            "10.0.0.0/8 via 10.0.0.1 dev eth0\n",
        );
        let err = linux(dir.path()).gateways(&runner).await.unwrap_err();
        assert!(matches!(err, NetError::NoGatewayFound { family: None }));
    }

    #[tokio::test]
    async fn kernel_table_tier_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("route")).unwrap();
        writeln!(
            f,
            "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT"
        )
        .unwrap();
        writeln!(f, "eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0").unwrap();

        let runner = ScriptedRunner::new();
        let set = linux(dir.path()).gateways(&runner).await.unwrap();
        assert_eq!(set.gateways.len(), 1);
        assert_eq!(set.gateways[0].gateway, "192.168.1.1");
        assert_eq!(set.gateways[0].source, "/proc/net/route");
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn default_gateway_for_missing_family() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().ok(
            "ip -4 -j route show default",
            r#"[{"dst":"default","gateway":"10.0.0.1","dev":"eth0"}]"#,
        );
        let adapter = linux(dir.path());
        let v4 = adapter.default_gateway(&runner, IpFamily::V4).await.unwrap();
        assert_eq!(v4.gateway, "10.0.0.1");
        let err = adapter
            .default_gateway(&runner, IpFamily::V6)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NetError::NoGatewayFound {
                family: Some(IpFamily::V6)
            }
        ));
    }

    #[tokio::test]
    async fn windows_accepts_single_object() {
        let runner = ScriptedRunner::new()
            .ok(
                &format!(
                    "powershell -NoProfile -NonInteractive -Command {}",
                    windows_gateway_script(IpFamily::V4)
                ),
                r#"{"InterfaceAlias":"Ethernet","NextHop":"192.168.0.1","RouteMetric":25}"#,
            )
            .ok(
                &format!(
                    "powershell -NoProfile -NonInteractive -Command {}",
                    windows_gateway_script(IpFamily::V6)
                ),
                r#"[{"InterfaceAlias":"Ethernet","NextHop":"::","RouteMetric":256}]"#,
            );
        let adapter = GatewayAdapter::for_os(Os::Windows, SECS, PathBuf::new(), PathBuf::new());
        let set = adapter.gateways(&runner).await.unwrap();
        assert_eq!(set.gateways.len(), 1);
        assert_eq!(set.gateways[0].metric, 25);
        assert_eq!(set.gateways[0].source, "PowerShell");
    }

    #[tokio::test]
    async fn macos_netstat_defaults() {
        let runner = ScriptedRunner::new().ok(
            "netstat -rn",
            "Internet:\nDestination        Gateway            Flags        Netif Expire\n\
             default            192.168.1.1        UGScg          en0\n\
             192.168.1          link#6             UCS            en0      !\n",
        );
        let adapter = GatewayAdapter::for_os(Os::MacOS, SECS, PathBuf::new(), PathBuf::new());
        let set = adapter.gateways(&runner).await.unwrap();
        assert_eq!(set.gateways.len(), 1);
        assert_eq!(set.gateways[0].interface, "en0");
    }

    #[test]
    fn designation_is_first_seen() {
        let rec = |gw: &str| GatewayRecord {
            interface: "eth0".into(),
            gateway: gw.into(),
            family: IpFamily::of(gw),
            metric: 0,
            source: "test",
            is_default: true,
        };
        let out = designate_defaults(vec![rec("10.0.0.9"), rec("10.0.0.1"), rec("fe80::1")]);
        assert!(out[0].is_default);
        assert!(!out[1].is_default);
        assert!(out[2].is_default);
    }
}
