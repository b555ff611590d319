//! `netinfo connections`: sockets with their owning processes.

use anyhow::Result;
use colored::Colorize;

use super::{is_json, or_dash, padded, print_json, section};
use crate::domain::connections::{by_port, by_process, listening};
use crate::domain::records::{ConnectionRecord, ConnectionTotals};
use crate::domain::Probe;

pub fn run(
    probe: &Probe,
    format: &str,
    listening_only: bool,
    group_by_process: bool,
    port: Option<u16>,
) -> Result<()> {
    let rt = super::runtime()?;
    rt.block_on(run_async(probe, format, listening_only, group_by_process, port))
}

async fn run_async(
    probe: &Probe,
    format: &str,
    listening_only: bool,
    group_by_process: bool,
    port: Option<u16>,
) -> Result<()> {
    let set = probe.connections().await?;

    if listening_only {
        let ports = listening(&set, probe.config());
        if is_json(format) {
            return print_json(&ports);
        }
        section("Listening");
        for p in &ports {
            println!(
                "  {:<6} {:<5} {:<5} {} {:>7}  {}",
                p.port,
                p.transport.to_string(),
                p.family.to_string(),
                padded(or_dash(&p.service), 14).cyan(),
                p.pid,
                or_dash(&p.process)
            );
        }
        return Ok(());
    }

    if group_by_process {
        let groups = by_process(&set);
        if is_json(format) {
            return print_json(&groups);
        }
        section("By process");
        for g in &groups {
            println!(
                "  {:<24} pid {:<7} {}",
                g.process.bold(),
                g.pid,
                totals_line(&g.totals)
            );
        }
        return Ok(());
    }

    if let Some(port) = port {
        let matches = by_port(&set, port);
        if is_json(format) {
            return print_json(&matches);
        }
        section(&format!("Port {}", port));
        for c in &matches {
            print_connection(c);
        }
        return Ok(());
    }

    if is_json(format) {
        return print_json(&set);
    }
    section("Connections");
    for c in &set.connections {
        print_connection(c);
    }
    println!();
    println!("  {}", totals_line(&set.totals));
    Ok(())
}

fn print_connection(c: &ConnectionRecord) {
    let status = padded(&c.status, 12);
    let status = match c.status.as_str() {
        "ESTABLISHED" => status.green().to_string(),
        "LISTEN" => status.cyan().to_string(),
        _ => status,
    };
    println!(
        "  {:<5} {:<46} {:<46} {} {:>7}  {}",
        c.transport.to_string(),
        c.local_addr,
        or_dash(&c.remote_addr),
        status,
        c.pid,
        or_dash(&c.process)
    );
}

fn totals_line(t: &ConnectionTotals) -> String {
    format!(
        "total {}  tcp {}  udp {}  listening {}  established {}",
        t.total, t.tcp, t.udp, t.listening, t.established
    )
}
