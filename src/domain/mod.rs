pub mod connections;
pub mod dns;
pub mod fallback;
pub mod gateway;
pub mod interfaces;
pub mod ping;
pub mod powershell;
pub mod public_ip;
pub mod records;
pub mod route_table;
pub mod routes;
pub mod runner;

use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{retry, NetError};
use crate::platform::Os;
use connections::{ConnectionsAdapter, SocketSource, SystemSockets};
use dns::DnsAdapter;
use gateway::GatewayAdapter;
use interfaces::InterfacesAdapter;
use ping::{PingAdapter, PingProfile};
use public_ip::{EchoFetcher, HttpFetcher, PublicIpAdapter};
use records::{
    ConnectionSet, DnsConfig, DnsRecord, GatewayRecord, GatewaySet, GeoLocation, InterfaceRecord,
    IpFamily, LocalAddresses, PingRecord, Resolution, RouteRecord,
};
use routes::RoutesAdapter;
use runner::{CommandRunner, SystemRunner};

const LOOPBACK: &str = "127.0.0.1";

// ═══════════════════════════════════════════════════════════════════
// Probe
// ═══════════════════════════════════════════════════════════════════

/// One entry point per network domain. The platform strategy for every
/// domain is chosen once, here.
pub struct Probe {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn EchoFetcher>,
    interfaces: InterfacesAdapter,
    dns: DnsAdapter,
    gateway: GatewayAdapter,
    routes: RoutesAdapter,
    connections: ConnectionsAdapter,
    ping: PingAdapter,
    public_ip: PublicIpAdapter,
}

impl Probe {
    /// Probe backed by real processes, sockets and HTTP.
    pub fn new(os: Os, config: Config) -> Result<Self, NetError> {
        let fetcher = HttpFetcher::new(config.timeouts.http_request())?;
        Ok(Self::with_backends(
            os,
            config,
            Arc::new(SystemRunner),
            Arc::new(SystemSockets),
            Arc::new(fetcher),
        ))
    }

    pub fn with_backends(
        os: Os,
        config: Config,
        runner: Arc<dyn CommandRunner>,
        sockets: Arc<dyn SocketSource>,
        fetcher: Arc<dyn EchoFetcher>,
    ) -> Self {
        let t = &config.timeouts;
        let paths = &config.paths;
        let ping = PingAdapter::new(
            os,
            PingProfile {
                count: config.ping.count,
                timeout: t.ping(),
            },
            PingProfile {
                count: config.ping.quick_count,
                timeout: t.quick_ping(),
            },
            config.ping.settle(),
        );
        let public_ip = PublicIpAdapter::new(
            config.public_ip.endpoints.clone(),
            config.public_ip.geolocation_url.clone(),
            t.public_ip_deadline(),
        );
        debug!(os = %os, "probe strategies selected");

        Self {
            interfaces: InterfacesAdapter::for_os(os, t.command()),
            dns: DnsAdapter::for_os(os, t.dns(), paths.resolv_conf.clone()),
            gateway: GatewayAdapter::for_os(
                os,
                t.command(),
                paths.ipv4_route_table.clone(),
                paths.ipv6_route_table.clone(),
            ),
            routes: RoutesAdapter::for_os(
                os,
                t.command(),
                paths.ipv4_route_table.clone(),
                paths.ipv6_route_table.clone(),
            ),
            connections: ConnectionsAdapter::new(sockets, t.connections()),
            ping,
            public_ip,
            runner,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    // ── Interfaces / IP ──────────────────────────────────────

    pub async fn interfaces(&self) -> Result<Vec<InterfaceRecord>, NetError> {
        retry(self.config.max_retries, move || {
            self.interfaces.interfaces(self.runner())
        })
        .await
    }

    pub async fn find_interface(&self, name: &str) -> Result<InterfaceRecord, NetError> {
        retry(self.config.max_retries, move || {
            self.interfaces.find_interface(self.runner(), name)
        })
        .await
    }

    pub async fn active_interfaces(&self) -> Result<Vec<InterfaceRecord>, NetError> {
        retry(self.config.max_retries, move || {
            self.interfaces.active_interfaces(self.runner())
        })
        .await
    }

    pub async fn local_addresses(&self) -> Result<Vec<LocalAddresses>, NetError> {
        Ok(interfaces::local_addresses(&self.interfaces().await?))
    }

    pub async fn public_ip(&self) -> Result<IpAddr, NetError> {
        retry(self.config.max_retries, move || {
            self.public_ip.public_ip(self.fetcher.as_ref())
        })
        .await
    }

    pub async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, NetError> {
        self.public_ip.locate(self.fetcher.as_ref(), ip).await
    }

    // ── DNS ──────────────────────────────────────────────────

    pub async fn dns_config(&self) -> Result<DnsConfig, NetError> {
        retry(self.config.max_retries, move || self.dns.config(self.runner())).await
    }

    pub async fn dns_for_interface(&self, interface: &str) -> Result<DnsRecord, NetError> {
        retry(self.config.max_retries, move || {
            self.dns.servers_for_interface(self.runner(), interface)
        })
        .await
    }

    pub async fn resolve(&self, host: &str) -> Result<Resolution, NetError> {
        let timeout = self.config.timeouts.dns();
        retry(self.config.max_retries, move || dns::resolve(host, timeout)).await
    }

    // ── Gateway / routes ─────────────────────────────────────

    pub async fn gateways(&self) -> Result<GatewaySet, NetError> {
        retry(self.config.max_retries, move || {
            self.gateway.gateways(self.runner())
        })
        .await
    }

    pub async fn default_gateway(&self, family: IpFamily) -> Result<GatewayRecord, NetError> {
        retry(self.config.max_retries, move || {
            self.gateway.default_gateway(self.runner(), family)
        })
        .await
    }

    pub async fn routes(&self) -> Result<Vec<RouteRecord>, NetError> {
        retry(self.config.max_retries, move || self.routes.routes(self.runner())).await
    }

    pub async fn routes_by_interface(&self, interface: &str) -> Result<Vec<RouteRecord>, NetError> {
        retry(self.config.max_retries, move || {
            self.routes.routes_by_interface(self.runner(), interface)
        })
        .await
    }

    pub async fn default_routes(&self) -> Result<Vec<RouteRecord>, NetError> {
        retry(self.config.max_retries, move || self.routes.default_routes(self.runner())).await
    }

    // ── Connections ──────────────────────────────────────────

    pub async fn connections(&self) -> Result<ConnectionSet, NetError> {
        retry(self.config.max_retries, move || self.connections.connections()).await
    }

    // ── Ping ─────────────────────────────────────────────────

    /// Standard ping, optionally with a different packet count.
    pub async fn ping(&self, host: &str, count: Option<u32>) -> Result<PingRecord, NetError> {
        let mut profile = self.ping.standard;
        if let Some(count) = count {
            profile.count = count;
        }
        self.ping.ping(self.runner(), host, profile).await
    }

    pub async fn ping_many(&self, hosts: &[String]) -> Vec<PingRecord> {
        self.ping.ping_many(self.runner(), hosts).await
    }

    /// Walk outward from this host: loopback, IPv4 gateway, first IPv4 DNS
    /// server, then the internet anchor. A failed step does not stop the
    /// walk.
    pub async fn connectivity(&self) -> Vec<ConnectivityStep> {
        let gateway = self
            .default_gateway(IpFamily::V4)
            .await
            .map(|g| g.gateway);
        let dns = self.dns_config().await.and_then(|c| {
            c.servers
                .iter()
                .find_map(|r| r.ipv4.first().cloned())
                .ok_or_else(|| NetError::NotFound("IPv4 DNS server".to_string()))
        });

        let targets = [
            ("loopback", Ok(LOOPBACK.to_string())),
            ("gateway", gateway),
            ("dns", dns),
            ("internet", Ok(self.config.ping.internet_anchor.clone())),
        ];

        let mut steps = Vec::with_capacity(targets.len());
        for (name, target) in targets {
            let step = match target {
                Ok(host) => match self.ping.quick_ping(self.runner(), &host).await {
                    Ok(record) => ConnectivityStep {
                        name,
                        target: Some(host),
                        error: record.error.clone(),
                        reachable: record.success,
                        ping: Some(record),
                    },
                    Err(e) => ConnectivityStep::failed(name, Some(host), e),
                },
                Err(e) => ConnectivityStep::failed(name, None, e),
            };
            info!(step = name, reachable = step.reachable, "connectivity step");
            steps.push(step);
        }
        steps
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityStep {
    pub name: &'static str,
    pub target: Option<String>,
    pub reachable: bool,
    pub ping: Option<PingRecord>,
    pub error: Option<String>,
}

impl ConnectivityStep {
    fn failed(name: &'static str, target: Option<String>, error: NetError) -> Self {
        Self {
            name,
            target,
            reachable: false,
            ping: None,
            error: Some(error.to_string()),
        }
    }
}
