//! `netinfo interfaces`: network interfaces and their addresses.

use anyhow::Result;
use colored::Colorize;

use super::{is_json, or_dash, padded, print_json, section};
use crate::domain::records::{InterfaceRecord, LinkStatus};
use crate::domain::Probe;

pub fn run(probe: &Probe, format: &str, name: Option<&str>, active: bool) -> Result<()> {
    let rt = super::runtime()?;
    rt.block_on(run_async(probe, format, name, active))
}

async fn run_async(probe: &Probe, format: &str, name: Option<&str>, active: bool) -> Result<()> {
    let interfaces = match name {
        Some(name) => vec![probe.find_interface(name).await?],
        None if active => probe.active_interfaces().await?,
        None => probe.interfaces().await?,
    };

    if is_json(format) {
        return print_json(&interfaces);
    }

    section("Interfaces");
    if interfaces.is_empty() {
        println!("  (none)");
    }
    for iface in &interfaces {
        print_interface(iface);
    }
    Ok(())
}

fn print_interface(iface: &InterfaceRecord) {
    let status = match iface.status() {
        LinkStatus::Up => padded("UP", 6).green(),
        LinkStatus::Down => padded("DOWN", 6).red(),
    };
    println!(
        "  {} {} mtu {:<6} {}",
        padded(&iface.name, 16).bold(),
        status,
        iface.mtu,
        or_dash(&iface.hardware_addr).dimmed()
    );
    for addr in &iface.addresses {
        println!("    {}", addr);
    }
}
