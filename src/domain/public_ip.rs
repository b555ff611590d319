//! Public address discovery through HTTPS echo services.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::records::GeoLocation;
use crate::error::NetError;

/// GET a URL and hand back the body of a successful response.
#[async_trait]
pub trait EchoFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, NetError>;
}

pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, NetError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("netinfo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetError::Http {
                url: String::new(),
                detail: format!("building HTTP client: {}", e),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl EchoFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, NetError> {
        let http_err = |detail: String| NetError::Http {
            url: url.to_string(),
            detail,
        };
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| http_err(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(http_err(format!("returned {}", resp.status())));
        }
        resp.text().await.map_err(|e| http_err(e.to_string()))
    }
}

pub struct PublicIpAdapter {
    endpoints: Vec<String>,
    geolocation_url: String,
    deadline: Duration,
}

impl PublicIpAdapter {
    pub fn new(endpoints: Vec<String>, geolocation_url: String, deadline: Duration) -> Self {
        Self {
            endpoints,
            geolocation_url,
            deadline,
        }
    }

    /// Ask each endpoint in order until one answers with a bare IP address.
    /// The overall deadline is checked before every attempt.
    pub async fn public_ip(&self, fetcher: &dyn EchoFetcher) -> Result<IpAddr, NetError> {
        let started = Instant::now();
        let mut last_error = None;

        for url in &self.endpoints {
            if started.elapsed() >= self.deadline {
                warn!(deadline = ?self.deadline, "public IP deadline reached");
                return Err(NetError::Deadline {
                    operation: "public IP lookup",
                    deadline: self.deadline,
                });
            }
            match fetcher.fetch(url).await {
                Ok(body) => match body.trim().parse::<IpAddr>() {
                    Ok(ip) => {
                        debug!(endpoint = %url, ip = %ip, "public IP found");
                        return Ok(ip);
                    }
                    Err(_) => {
                        debug!(endpoint = %url, "response is not an IP address");
                        last_error = Some(NetError::Http {
                            url: url.clone(),
                            detail: "response is not an IP address".to_string(),
                        });
                    }
                },
                Err(e) => {
                    debug!(endpoint = %url, error = %e, "endpoint failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| NetError::Validation("no public IP endpoints configured".to_string())))
    }

    /// Geolocation for an address from the configured lookup service.
    pub async fn locate(&self, fetcher: &dyn EchoFetcher, ip: IpAddr) -> Result<GeoLocation, NetError> {
        let url = self.geolocation_url.replace("{ip}", &ip.to_string());
        let body = fetcher.fetch(&url).await?;
        parse_geolocation(&body)
    }
}

/// Accepts both the `ipapi.co` field names and the plain ones.
pub fn parse_geolocation(body: &str) -> Result<GeoLocation, NetError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| NetError::parse("geolocation response", e))?;
    if value.get("error").and_then(|v| v.as_bool()) == Some(true) {
        let reason = value
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("lookup refused");
        return Err(NetError::parse("geolocation response", reason));
    }

    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string)
    };
    Ok(GeoLocation {
        country: pick(&["country_name", "country"]),
        region: pick(&["region", "regionName"]),
        city: pick(&["city"]),
        isp: pick(&["org", "isp"]),
        timezone: pick(&["timezone"]),
    })
}


#[cfg(test)]
mod tests {
    use super::testing::CannedFetcher;
    use super::*;

    fn adapter(endpoints: &[&str]) -> PublicIpAdapter {
        PublicIpAdapter::new(
            endpoints.iter().map(|s| s.to_string()).collect(),
            "https://geo.test/{ip}/json/".to_string(),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn falls_through_failing_endpoints() {
        let fetcher = CannedFetcher::new(vec![Err(500), Err(500), Ok("203.0.113.7\n")]);
        let ip = adapter(&["https://a.test", "https://b.test", "https://c.test"])
            .public_ip(&fetcher)
            .await
            .unwrap();
        assert_eq!(ip.to_string(), "203.0.113.7");
        assert_eq!(fetcher.urls().len(), 3);
    }

    #[tokio::test]
    async fn garbage_body_moves_on() {
        let fetcher = CannedFetcher::new(vec![Ok("<html>rate limited</html>"), Ok(" 2001:db8::1 ")]);
        let ip = adapter(&["https://a.test", "https://b.test"])
            .public_ip(&fetcher)
            .await
            .unwrap();
        assert_eq!(ip.to_string(), "2001:db8::1");
    }

    #[tokio::test]
    async fn all_endpoints_failing_reports_last_error() {
        let fetcher = CannedFetcher::new(vec![Err(500), Err(503)]);
        let err = adapter(&["https://a.test", "https://b.test"])
            .public_ip(&fetcher)
            .await
            .unwrap_err();
        match err {
            NetError::Http { url, detail } => {
                assert_eq!(url, "https://b.test");
                assert!(detail.contains("503"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_endpoints_is_validation_error() {
        let err = adapter(&[])
            .public_ip(&CannedFetcher::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Validation(_)));
    }

    struct SlowFetcher;

    #[async_trait]
    impl EchoFetcher for SlowFetcher {
        async fn fetch(&self, url: &str) -> Result<String, NetError> {
            tokio::time::sleep(Duration::from_secs(6)).await;
            Err(NetError::Http {
                url: url.to_string(),
                detail: "operation timed out".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_before_next_attempt() {
        let err = adapter(&["https://a.test", "https://b.test", "https://c.test"])
            .public_ip(&SlowFetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Deadline { .. }));
    }

    #[tokio::test]
    async fn locate_fills_template() {
        let body = r#"{"ip":"203.0.113.7","city":"Lisbon","region":"Lisbon","country":"PT",
            "country_name":"Portugal","timezone":"Europe/Lisbon","org":"Example ISP"}"#;
        let fetcher = CannedFetcher::new(vec![Ok(body)]);
        let geo = adapter(&[])
            .locate(&fetcher, "203.0.113.7".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(fetcher.urls(), vec!["https://geo.test/203.0.113.7/json/"]);
        assert_eq!(geo.country.as_deref(), Some("Portugal"));
        assert_eq!(geo.isp.as_deref(), Some("Example ISP"));
        assert_eq!(geo.timezone.as_deref(), Some("Europe/Lisbon"));
    }

    #[test]
    fn geolocation_refusal_is_parse_error() {
        let err = parse_geolocation(r#"{"error":true,"reason":"RateLimited"}"#).unwrap_err();
        assert!(err.to_string().contains("RateLimited"));
    }
}
