//! `netinfo ping` and `netinfo ping-many`.

use anyhow::Result;
use colored::{ColoredString, Colorize};
use serde::Serialize;

use super::{is_json, padded, print_json, section};
use crate::domain::ping::{assess, Assessment, LatencyBand, LossBand};
use crate::domain::records::PingRecord;
use crate::domain::Probe;

#[derive(Serialize)]
struct Assessed<'a> {
    #[serde(flatten)]
    record: &'a PingRecord,
    assessment: Assessment,
}

fn assessed(records: &[PingRecord]) -> Vec<Assessed<'_>> {
    records
        .iter()
        .map(|record| Assessed {
            record,
            assessment: assess(record),
        })
        .collect()
}

pub fn run(probe: &Probe, format: &str, host: &str, count: Option<u32>) -> Result<()> {
    let rt = super::runtime()?;
    let record = rt.block_on(probe.ping(host, count))?;

    if is_json(format) {
        return print_json(&Assessed {
            record: &record,
            assessment: assess(&record),
        });
    }
    section(&format!("Ping {}", host));
    print_record(&record);
    Ok(())
}

pub fn run_many(probe: &Probe, format: &str, hosts: Vec<String>) -> Result<()> {
    let hosts = if hosts.is_empty() {
        probe.config().ping.default_hosts.clone()
    } else {
        hosts
    };
    let rt = super::runtime()?;
    let records = rt.block_on(probe.ping_many(&hosts));

    if is_json(format) {
        return print_json(&assessed(&records));
    }
    section("Ping");
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &PingRecord) {
    if !record.success {
        println!(
            "  {} {}  {}",
            padded(&record.host, 24).bold(),
            "unreachable".red(),
            record.error.as_deref().unwrap_or("")
        );
        return;
    }
    let a = assess(record);
    println!(
        "  {} {}/{} received  loss {}  rtt min/avg/max {:.1}/{}/{:.1} ms",
        padded(&record.host, 24).bold(),
        record.packets_received,
        record.packets_sent,
        loss_label(record.packet_loss, a.loss),
        record.min_rtt_ms,
        latency_label(record.avg_rtt_ms, a.latency),
        record.max_rtt_ms
    );
}

fn loss_label(loss: f64, band: LossBand) -> ColoredString {
    let text = format!("{:.1}%", loss);
    match band {
        LossBand::Excellent => text.green(),
        LossBand::Good => text.yellow(),
        LossBand::Poor => text.red(),
    }
}

fn latency_label(avg: f64, band: LatencyBand) -> ColoredString {
    let text = format!("{:.1}", avg);
    match band {
        LatencyBand::Excellent => text.green(),
        LatencyBand::Good => text.yellow(),
        LatencyBand::Poor => text.red(),
    }
}
