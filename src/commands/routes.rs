//! `netinfo routes`: the routing table.

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;

use super::{is_json, or_dash, padded, print_json, section};
use crate::domain::records::{RouteRecord, RouteType};
use crate::domain::{routes, Probe};

pub fn run(
    probe: &Probe,
    format: &str,
    interface: Option<&str>,
    defaults: bool,
    summary: bool,
) -> Result<()> {
    let rt = super::runtime()?;
    rt.block_on(run_async(probe, format, interface, defaults, summary))
}

async fn run_async(
    probe: &Probe,
    format: &str,
    interface: Option<&str>,
    defaults: bool,
    summary: bool,
) -> Result<()> {
    let mut table = match interface {
        Some(name) => probe.routes_by_interface(name).await?,
        None if defaults => probe.default_routes().await?,
        None => probe.routes().await?,
    };
    if defaults && interface.is_some() {
        table.retain(|r| r.route_type == RouteType::Default);
    }

    if summary {
        let summary = routes::summarize(&table);
        if is_json(format) {
            return print_json(&summary);
        }
        section("Route summary");
        println!("  total: {}", summary.total);
        print_counts("by type", &summary.by_type);
        print_counts("by protocol", &summary.by_protocol);
        print_counts("by interface", &summary.by_interface);
        return Ok(());
    }

    if is_json(format) {
        return print_json(&table);
    }
    section("Routes");
    println!(
        "  {}",
        format!(
            "{:<44} {:<28} {:<12} {:>7}  {}",
            "DESTINATION", "GATEWAY", "INTERFACE", "METRIC", "PROTOCOL"
        )
        .bold()
    );
    for route in &table {
        print_route(route);
    }
    Ok(())
}

fn print_route(route: &RouteRecord) {
    let destination = padded(&route.destination, 44);
    let destination = match route.route_type {
        RouteType::Default => destination.green().to_string(),
        _ => destination,
    };
    println!(
        "  {} {:<28} {:<12} {:>7}  {}",
        destination,
        or_dash(&route.gateway),
        route.interface,
        route.metric,
        or_dash(&route.protocol)
    );
}

fn print_counts(label: &str, counts: &BTreeMap<String, usize>) {
    let parts: Vec<String> = counts.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    println!("  {}: {}", label, parts.join(" "));
}
