use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Automatic retries for timeout and network failures (0 = off).
    pub max_retries: u32,
    pub timeouts: Timeouts,
    pub ping: PingConfig,
    pub public_ip: PublicIpConfig,
    pub paths: PathsConfig,
    pub well_known_ports: Vec<WellKnownPort>,
    pub well_known_dns: Vec<WellKnownResolver>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub command_secs: u64,
    pub ping_secs: u64,
    pub quick_ping_secs: u64,
    pub dns_secs: u64,
    pub connections_secs: u64,
    pub http_request_secs: u64,
    pub public_ip_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub count: u32,
    pub quick_count: u32,
    pub settle_ms: u64,
    pub default_hosts: Vec<String>,
    pub internet_anchor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicIpConfig {
    pub endpoints: Vec<String>,
    pub geolocation_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub resolv_conf: PathBuf,
    pub ipv4_route_table: PathBuf,
    pub ipv6_route_table: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellKnownPort {
    pub port: u16,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellKnownResolver {
    pub address: String,
    pub provider: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            max_retries: 0,
            timeouts: Timeouts::default(),
            ping: PingConfig::default(),
            public_ip: PublicIpConfig::default(),
            paths: PathsConfig::default(),
            well_known_ports: default_ports(),
            well_known_dns: default_resolvers(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_secs: 10,
            ping_secs: 10,
            quick_ping_secs: 5,
            dns_secs: 5,
            connections_secs: 15,
            http_request_secs: 5,
            public_ip_deadline_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn ping(&self) -> Duration {
        Duration::from_secs(self.ping_secs)
    }

    pub fn quick_ping(&self) -> Duration {
        Duration::from_secs(self.quick_ping_secs)
    }

    pub fn dns(&self) -> Duration {
        Duration::from_secs(self.dns_secs)
    }

    pub fn connections(&self) -> Duration {
        Duration::from_secs(self.connections_secs)
    }

    pub fn http_request(&self) -> Duration {
        Duration::from_secs(self.http_request_secs)
    }

    pub fn public_ip_deadline(&self) -> Duration {
        Duration::from_secs(self.public_ip_deadline_secs)
    }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 4,
            quick_count: 3,
            settle_ms: 500,
            default_hosts: vec![
                "8.8.8.8".to_string(),
                "1.1.1.1".to_string(),
                "google.com".to_string(),
                "github.com".to_string(),
            ],
            internet_anchor: "8.8.8.8".to_string(),
        }
    }
}

impl PingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://api.ipify.org".to_string(),
                "https://ifconfig.me/ip".to_string(),
                "https://icanhazip.com".to_string(),
                "https://ident.me".to_string(),
                "https://ipecho.net/plain".to_string(),
            ],
            geolocation_url: "https://ipapi.co/{ip}/json/".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            ipv4_route_table: PathBuf::from("/proc/net/route"),
            ipv6_route_table: PathBuf::from("/proc/net/ipv6_route"),
        }
    }
}

fn default_ports() -> Vec<WellKnownPort> {
    [
        (20, "FTP Data"),
        (21, "FTP"),
        (22, "SSH"),
        (23, "Telnet"),
        (25, "SMTP"),
        (53, "DNS"),
        (67, "DHCP Server"),
        (68, "DHCP Client"),
        (80, "HTTP"),
        (110, "POP3"),
        (123, "NTP"),
        (143, "IMAP"),
        (161, "SNMP"),
        (389, "LDAP"),
        (443, "HTTPS"),
        (445, "SMB"),
        (465, "SMTPS"),
        (587, "SMTP Submission"),
        (631, "IPP"),
        (993, "IMAPS"),
        (995, "POP3S"),
        (1433, "MSSQL"),
        (3306, "MySQL"),
        (3389, "RDP"),
        (5353, "mDNS"),
        (5432, "PostgreSQL"),
        (5900, "VNC"),
        (6379, "Redis"),
        (8080, "HTTP Alt"),
        (8443, "HTTPS Alt"),
        (27017, "MongoDB"),
    ]
    .into_iter()
    .map(|(port, service)| WellKnownPort {
        port,
        service: service.to_string(),
    })
    .collect()
}

fn default_resolvers() -> Vec<WellKnownResolver> {
    [
        ("8.8.8.8", "Google"),
        ("8.8.4.4", "Google"),
        ("2001:4860:4860::8888", "Google"),
        ("2001:4860:4860::8844", "Google"),
        ("1.1.1.1", "Cloudflare"),
        ("1.0.0.1", "Cloudflare"),
        ("2606:4700:4700::1111", "Cloudflare"),
        ("2606:4700:4700::1001", "Cloudflare"),
        ("208.67.222.222", "OpenDNS"),
        ("208.67.220.220", "OpenDNS"),
        ("9.9.9.9", "Quad9"),
        ("149.112.112.112", "Quad9"),
    ]
    .into_iter()
    .map(|(address, provider)| WellKnownResolver {
        address: address.to_string(),
        provider: provider.to_string(),
    })
    .collect()
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("netinfo").join("config.yaml"))
    }

    pub fn service_name(&self, port: u16) -> Option<&str> {
        self.well_known_ports
            .iter()
            .find(|p| p.port == port)
            .map(|p| p.service.as_str())
    }

    pub fn resolver_provider(&self, address: &str) -> Option<&str> {
        self.well_known_dns
            .iter()
            .find(|r| r.address == address)
            .map(|r| r.provider.as_str())
    }
}

/// Load configuration: built-in defaults, then the YAML file, then
/// `NETINFO_*` environment variables (`__` separates nested keys).
pub fn load(custom_path: Option<&Path>) -> Result<Config> {
    let path = match custom_path {
        Some(p) => {
            if !p.exists() {
                anyhow::bail!("config file not found: {}", p.display());
            }
            Some(p.to_path_buf())
        }
        None => Config::path().ok().filter(|p| p.exists()),
    };
    extract(path.as_deref(), Env::prefixed("NETINFO_").split("__"))
}

fn extract(path: Option<&Path>, env: Env) -> Result<Config> {
    let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
    if let Some(path) = path {
        figment = figment.merge(Yaml::file(path));
    }
    figment
        .merge(env)
        .extract()
        .with_context(|| match path {
            Some(p) => format!("loading configuration from {}", p.display()),
            None => "loading configuration".to_string(),
        })
}

pub fn to_yaml(config: &Config) -> Result<String> {
    serde_yaml::to_string(config).context("serializing config")
}
