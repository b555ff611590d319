//! `netinfo ip`: local addresses and the public address.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tracing::warn;

use super::{is_json, or_dash, padded, print_json, section};
use crate::domain::records::{GeoLocation, LocalAddresses};
use crate::domain::Probe;

#[derive(Serialize)]
struct IpReport {
    local: Vec<LocalAddresses>,
    public: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<GeoLocation>,
}

pub fn run(probe: &Probe, format: &str, no_public: bool, locate: bool) -> Result<()> {
    let rt = super::runtime()?;
    rt.block_on(run_async(probe, format, no_public, locate))
}

async fn run_async(probe: &Probe, format: &str, no_public: bool, locate: bool) -> Result<()> {
    let local = probe.local_addresses().await?;

    // public lookups are best effort; local data is still worth showing
    let public = if no_public {
        None
    } else {
        match probe.public_ip().await {
            Ok(ip) => Some(ip),
            Err(e) => {
                warn!(error = %e, "public IP unavailable");
                None
            }
        }
    };
    let location = match public {
        Some(ip) if locate => match probe.locate(ip).await {
            Ok(geo) => Some(geo),
            Err(e) => {
                warn!(error = %e, ip = %ip, "geolocation unavailable");
                None
            }
        },
        _ => None,
    };

    let report = IpReport {
        local,
        public: public.map(|ip| ip.to_string()),
        location,
    };
    if is_json(format) {
        return print_json(&report);
    }

    section("Local");
    if report.local.is_empty() {
        println!("  (no active addresses)");
    }
    for entry in &report.local {
        println!(
            "  {} v4 {:<16} v6 {}",
            padded(&entry.interface, 16).bold(),
            entry.ipv4.as_deref().unwrap_or("-"),
            entry.ipv6.as_deref().unwrap_or("-")
        );
    }

    if !no_public {
        println!();
        section("Public");
        match &report.public {
            Some(ip) => println!("  address:   {}", ip.green()),
            None => println!("  address:   {}", "unavailable".yellow()),
        }
    }
    if let Some(geo) = &report.location {
        let field = |v: &Option<String>| or_dash(v.as_deref().unwrap_or("")).to_string();
        println!("  country:   {}", field(&geo.country));
        println!("  region:    {}", field(&geo.region));
        println!("  city:      {}", field(&geo.city));
        println!("  isp:       {}", field(&geo.isp));
        println!("  timezone:  {}", field(&geo.timezone));
    }
    Ok(())
}
