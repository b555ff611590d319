//! `netinfo connectivity`: step-by-step reachability check.

use anyhow::Result;
use colored::Colorize;

use super::{is_json, padded, print_json, section};
use crate::domain::Probe;

pub fn run(probe: &Probe, format: &str) -> Result<()> {
    let rt = super::runtime()?;
    let steps = rt.block_on(probe.connectivity());

    if is_json(format) {
        return print_json(&steps);
    }

    section("Connectivity");
    for step in &steps {
        let verdict = if step.reachable {
            padded("ok", 5).green()
        } else {
            padded("fail", 5).red()
        };
        let rtt = step
            .ping
            .as_ref()
            .filter(|p| p.success)
            .map(|p| format!("{:.1} ms", p.avg_rtt_ms))
            .unwrap_or_default();
        println!(
            "  {:<10} {:<24} {} {}",
            step.name,
            step.target.as_deref().unwrap_or("-"),
            verdict,
            rtt
        );
        if let Some(err) = step.error.as_deref().filter(|_| !step.reachable) {
            println!("             {}", err.dimmed());
        }
    }
    Ok(())
}
