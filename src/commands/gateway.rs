//! `netinfo gateway`: default gateways per address family.

use anyhow::Result;
use colored::Colorize;

use super::{is_json, print_json, section};
use crate::domain::records::{GatewayRecord, IpFamily};
use crate::domain::Probe;

pub fn run(probe: &Probe, format: &str, family: Option<&str>) -> Result<()> {
    let family = family.map(str::parse::<IpFamily>).transpose()?;
    let rt = super::runtime()?;
    rt.block_on(run_async(probe, format, family))
}

async fn run_async(probe: &Probe, format: &str, family: Option<IpFamily>) -> Result<()> {
    let gateways = match family {
        Some(family) => vec![probe.default_gateway(family).await?],
        None => probe.gateways().await?.gateways,
    };

    if is_json(format) {
        return print_json(&gateways);
    }

    section("Gateways");
    for gw in &gateways {
        print_gateway(gw);
    }
    Ok(())
}

fn print_gateway(gw: &GatewayRecord) {
    let marker = if gw.is_default {
        "default".green().to_string()
    } else {
        String::new()
    };
    println!(
        "  {:<5} {:<28} dev {:<12} metric {:<6} {} {}",
        gw.family.to_string(),
        gw.gateway,
        gw.interface,
        gw.metric,
        format!("[{}]", gw.source).dimmed(),
        marker
    );
}
