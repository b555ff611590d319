//! Reachability through the OS `ping` utility.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

use super::records::PingRecord;
use super::runner::{CommandRunner, Execution};
use crate::error::NetError;
use crate::platform::Os;

static POSIX_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)% packet loss").expect("valid regex"));
static POSIX_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/avg/max/(?:mdev|stddev) = ([\d.]+)/([\d.]+)/([\d.]+)/([\d.]+) ms")
        .expect("valid regex")
});
static POSIX_PACKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").expect("valid regex")
});
static WINDOWS_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)% loss\)").expect("valid regex"));
static WINDOWS_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Minimum = (\d+)ms, Maximum = (\d+)ms, Average = (\d+)ms").expect("valid regex")
});
static WINDOWS_PACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Sent = (\d+), Received = (\d+)").expect("valid regex"));

/// Packet count and deadline for one ping run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingProfile {
    pub count: u32,
    pub timeout: Duration,
}

/// How a ping invocation ended.
#[derive(Debug)]
enum PingOutcome {
    Completed(Execution),
    TimedOut(Duration),
    Failed(String),
}

impl From<Result<Execution, NetError>> for PingOutcome {
    fn from(result: Result<Execution, NetError>) -> Self {
        match result {
            Ok(execution) => PingOutcome::Completed(execution),
            Err(NetError::CommandTimeout { timeout, .. }) => PingOutcome::TimedOut(timeout),
            Err(e) => PingOutcome::Failed(e.to_string()),
        }
    }
}

pub struct PingAdapter {
    os: Os,
    pub standard: PingProfile,
    pub quick: PingProfile,
    settle: Duration,
}

impl PingAdapter {
    pub fn new(os: Os, standard: PingProfile, quick: PingProfile, settle: Duration) -> Self {
        Self {
            os,
            standard,
            quick,
            settle,
        }
    }

    /// Arguments for the platform's `ping`.
    pub fn arguments(&self, host: &str, profile: PingProfile) -> Vec<String> {
        let count = profile.count.to_string();
        let wait = profile.timeout.as_secs().max(1).to_string();
        match self.os {
            Os::Linux => vec!["-c".into(), count, "-W".into(), wait, host.into()],
            Os::MacOS => vec!["-c".into(), count, "-t".into(), wait, host.into()],
            Os::Windows => vec!["-n".into(), count, host.into()],
        }
    }

    pub async fn ping(
        &self,
        runner: &dyn CommandRunner,
        host: &str,
        profile: PingProfile,
    ) -> Result<PingRecord, NetError> {
        validate_host(host)?;

        let args = self.arguments(host, profile);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let outcome = PingOutcome::from(runner.execute("ping", &args, profile.timeout).await);

        let mut record = PingRecord {
            host: host.to_string(),
            ..Default::default()
        };
        match outcome {
            PingOutcome::Completed(execution) => {
                match self.os {
                    Os::Windows => parse_windows(&mut record, &execution.stdout, profile.count),
                    Os::Linux | Os::MacOS => parse_posix(&mut record, &execution.stdout),
                }
                record.success = execution.success();
                if !record.success {
                    record.error = Some(match (execution.stderr_line(), execution.exit_code) {
                        (Some(line), _) => line.to_string(),
                        (None, Some(code)) => format!("ping exited with status {}", code),
                        (None, None) => "ping terminated by signal".to_string(),
                    });
                }
                record.raw_output = execution.stdout;
            }
            PingOutcome::TimedOut(timeout) => {
                record.error = Some(format!("ping timed out after {:?}", timeout));
            }
            PingOutcome::Failed(reason) => {
                record.error = Some(reason);
            }
        }
        debug!(host = %host, success = record.success, loss = record.packet_loss, "ping finished");
        Ok(record)
    }

    pub async fn quick_ping(
        &self,
        runner: &dyn CommandRunner,
        host: &str,
    ) -> Result<PingRecord, NetError> {
        self.ping(runner, host, self.quick).await
    }

    /// Ping hosts one after another with a settling pause in between. A
    /// failure for one host is recorded and the batch continues.
    pub async fn ping_many(&self, runner: &dyn CommandRunner, hosts: &[String]) -> Vec<PingRecord> {
        let mut results = Vec::with_capacity(hosts.len());
        for (i, host) in hosts.iter().enumerate() {
            info!(host = %host, n = i + 1, of = hosts.len(), "pinging");
            let record = match self.quick_ping(runner, host).await {
                Ok(record) => record,
                Err(e) => PingRecord {
                    host: host.clone(),
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            };
            results.push(record);
            if i + 1 < hosts.len() && !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }
        }
        results
    }
}

/// Reject anything `ping` could read as an option or that is not a single
/// token.
pub fn validate_host(host: &str) -> Result<(), NetError> {
    if host.is_empty() {
        return Err(NetError::Validation("host must not be empty".to_string()));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(NetError::Validation(format!(
            "host '{}' must not contain whitespace",
            host
        )));
    }
    if host.starts_with('-') {
        return Err(NetError::Validation(format!(
            "host '{}' must not start with '-'",
            host
        )));
    }
    Ok(())
}

/// Linux/macOS summary lines. Missing statistics stay zero.
pub fn parse_posix(record: &mut PingRecord, output: &str) {
    for line in output.lines().map(str::trim) {
        if let Some(caps) = POSIX_LOSS.captures(line) {
            record.packet_loss = caps[1].parse().unwrap_or(0.0);
        }
        if let Some(caps) = POSIX_RTT.captures(line) {
            record.min_rtt_ms = caps[1].parse().unwrap_or(0.0);
            record.avg_rtt_ms = caps[2].parse().unwrap_or(0.0);
            record.max_rtt_ms = caps[3].parse().unwrap_or(0.0);
            record.mdev_rtt_ms = caps[4].parse().unwrap_or(0.0);
        }
        if let Some(caps) = POSIX_PACKETS.captures(line) {
            record.packets_sent = caps[1].parse().unwrap_or(0);
            record.packets_received = caps[2].parse().unwrap_or(0);
        }
    }
}

/// Windows summary lines. Without a `Packets:` line the counts are derived
/// from the requested count and the loss.
pub fn parse_windows(record: &mut PingRecord, output: &str, requested: u32) {
    let mut packets = None;
    for line in output.lines().map(str::trim) {
        if let Some(caps) = WINDOWS_LOSS.captures(line) {
            record.packet_loss = caps[1].parse().unwrap_or(0.0);
        }
        if let Some(caps) = WINDOWS_RTT.captures(line) {
            record.min_rtt_ms = caps[1].parse().unwrap_or(0.0);
            record.max_rtt_ms = caps[2].parse().unwrap_or(0.0);
            record.avg_rtt_ms = caps[3].parse().unwrap_or(0.0);
        }
        if let Some(caps) = WINDOWS_PACKETS.captures(line) {
            packets = Some((
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
            ));
        }
    }
    let (sent, received) = packets.unwrap_or_else(|| {
        let received = (requested as f64 * (100.0 - record.packet_loss) / 100.0) as u32;
        (requested, received)
    });
    record.packets_sent = sent;
    record.packets_received = received;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LossBand {
    /// No packets lost.
    Excellent,
    /// Under 5%.
    Good,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LatencyBand {
    /// Under 50 ms.
    Excellent,
    /// Under 200 ms.
    Good,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub loss: LossBand,
    pub latency: LatencyBand,
}

pub fn assess(record: &PingRecord) -> Assessment {
    let loss = if record.packet_loss == 0.0 {
        LossBand::Excellent
    } else if record.packet_loss < 5.0 {
        LossBand::Good
    } else {
        LossBand::Poor
    };
    let latency = if record.avg_rtt_ms < 50.0 {
        LatencyBand::Excellent
    } else if record.avg_rtt_ms < 200.0 {
        LatencyBand::Good
    } else {
        LatencyBand::Poor
    };
    Assessment { loss, latency }
}
