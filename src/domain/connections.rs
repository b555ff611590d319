//! Socket table snapshot correlated with the process table.

use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, TcpState};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, warn};

use super::records::{
    ConnectionRecord, ConnectionSet, ConnectionTotals, IpFamily, ListeningPort, ProcessGroup,
    Transport,
};
use crate::config::Config;
use crate::error::NetError;

const UNKNOWN_PROCESS: &str = "Unknown";

/// One socket as the OS reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSocket {
    pub tcp: bool,
    pub local: Option<SocketAddr>,
    pub remote: Option<SocketAddr>,
    pub state: String,
    pub pid: u32,
}

/// Blocking access to the socket and process tables.
pub trait SocketSource: Send + Sync {
    fn sockets(&self) -> Result<Vec<RawSocket>, NetError>;

    /// pid → process name. Processes that vanish mid-scan are simply absent.
    fn process_names(&self) -> HashMap<u32, String>;
}

/// The live tables via `netstat2` and `sysinfo`.
pub struct SystemSockets;

impl SocketSource for SystemSockets {
    fn sockets(&self) -> Result<Vec<RawSocket>, NetError> {
        let sockets = get_sockets_info(
            AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6,
            ProtocolFlags::TCP | ProtocolFlags::UDP,
        )
        .map_err(|e| NetError::Collection(e.to_string()))?;

        Ok(sockets
            .into_iter()
            .map(|socket| {
                let pid = socket.associated_pids.first().copied().unwrap_or(0);
                match socket.protocol_socket_info {
                    ProtocolSocketInfo::Tcp(tcp) => RawSocket {
                        tcp: true,
                        local: Some(SocketAddr::new(tcp.local_addr, tcp.local_port)),
                        remote: Some(SocketAddr::new(tcp.remote_addr, tcp.remote_port)),
                        state: tcp_state_name(&tcp.state).to_string(),
                        pid,
                    },
                    ProtocolSocketInfo::Udp(udp) => RawSocket {
                        tcp: false,
                        local: Some(SocketAddr::new(udp.local_addr, udp.local_port)),
                        remote: None,
                        state: "NONE".to_string(),
                        pid,
                    },
                }
            })
            .collect())
    }

    fn process_names(&self) -> HashMap<u32, String> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        system
            .processes()
            .iter()
            .map(|(pid, process)| (pid.as_u32(), process.name().to_string_lossy().to_string()))
            .collect()
    }
}

fn tcp_state_name(state: &TcpState) -> &'static str {
    match state {
        TcpState::Established => "ESTABLISHED",
        TcpState::Listen => "LISTEN",
        TcpState::SynSent => "SYN_SENT",
        TcpState::SynReceived => "SYN_RECV",
        TcpState::FinWait1 => "FIN_WAIT1",
        TcpState::FinWait2 => "FIN_WAIT2",
        TcpState::TimeWait => "TIME_WAIT",
        TcpState::Closed => "CLOSE",
        TcpState::CloseWait => "CLOSE_WAIT",
        TcpState::LastAck => "LAST_ACK",
        TcpState::Closing => "CLOSING",
        TcpState::DeleteTcb => "DELETE_TCB",
        _ => "UNKNOWN",
    }
}

/// Canonical connection status. `LISTENING` becomes `LISTEN`; anything else
/// is upper-cased and otherwise kept.
pub fn normalize_status(status: &str) -> String {
    let upper = status.trim().to_uppercase();
    match upper.as_str() {
        "LISTENING" => "LISTEN".to_string(),
        _ => upper,
    }
}

/// Build canonical records from raw sockets and a pid → name table.
pub fn correlate(raw: Vec<RawSocket>, names: &HashMap<u32, String>) -> ConnectionSet {
    let connections: Vec<ConnectionRecord> = raw
        .into_iter()
        .filter_map(|socket| {
            let local = socket.local?;
            let family = IpFamily::of_ip(&local.ip());
            let transport = match (socket.tcp, family) {
                (true, IpFamily::V4) => Transport::Tcp,
                (true, IpFamily::V6) => Transport::Tcp6,
                (false, IpFamily::V4) => Transport::Udp,
                (false, IpFamily::V6) => Transport::Udp6,
            };
            let remote_addr = match socket.remote {
                Some(remote) if socket.tcp && !remote.ip().is_unspecified() => remote.to_string(),
                _ => String::new(),
            };
            Some(ConnectionRecord {
                family,
                transport,
                local_addr: local.to_string(),
                remote_addr,
                status: normalize_status(&socket.state),
                pid: socket.pid,
                process: names.get(&socket.pid).cloned().unwrap_or_default(),
            })
        })
        .collect();

    ConnectionSet {
        totals: ConnectionTotals::tally(&connections),
        connections,
    }
}

pub struct ConnectionsAdapter {
    source: Arc<dyn SocketSource>,
    timeout: Duration,
}

impl ConnectionsAdapter {
    pub fn new(source: Arc<dyn SocketSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub async fn connections(&self) -> Result<ConnectionSet, NetError> {
        let source = self.source.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            let sockets = source.sockets()?;
            let names = source.process_names();
            Ok::<_, NetError>((sockets, names))
        });

        let (sockets, names) = tokio::time::timeout(self.timeout, snapshot)
            .await
            .map_err(|_| NetError::Deadline {
                operation: "socket enumeration",
                deadline: self.timeout,
            })?
            .map_err(|e| NetError::Collection(e.to_string()))??;

        debug!(sockets = sockets.len(), processes = names.len(), "socket snapshot taken");
        if names.is_empty() && !sockets.is_empty() {
            warn!("process table empty; connections will have no process names");
        }
        Ok(correlate(sockets, &names))
    }
}

/// Listening sockets, sorted by port, labelled with well-known service names.
pub fn listening(set: &ConnectionSet, config: &Config) -> Vec<ListeningPort> {
    let mut ports: Vec<ListeningPort> = set
        .connections
        .iter()
        .filter(|c| c.status == "LISTEN")
        .filter_map(|c| {
            let port = c.local_port()?;
            Some(ListeningPort {
                port,
                transport: c.transport,
                family: c.family,
                service: config.service_name(port).unwrap_or("").to_string(),
                pid: c.pid,
                process: c.process.clone(),
            })
        })
        .collect();
    ports.sort_by_key(|p| (p.port, p.family));
    ports
}

/// Per-process counters, ordered by process name. Unresolved processes are
/// grouped under "Unknown".
pub fn by_process(set: &ConnectionSet) -> Vec<ProcessGroup> {
    let mut groups: BTreeMap<&str, Vec<&ConnectionRecord>> = BTreeMap::new();
    for c in &set.connections {
        let name = if c.process.is_empty() {
            UNKNOWN_PROCESS
        } else {
            c.process.as_str()
        };
        groups.entry(name).or_default().push(c);
    }
    groups
        .into_iter()
        .map(|(process, records)| ProcessGroup {
            process: process.to_string(),
            pid: records.first().map(|r| r.pid).unwrap_or(0),
            totals: ConnectionTotals::tally(records.iter().copied()),
        })
        .collect()
}

/// Connections whose local or remote port matches.
pub fn by_port(set: &ConnectionSet, port: u16) -> Vec<ConnectionRecord> {
    set.connections
        .iter()
        .filter(|c| c.local_port() == Some(port) || c.remote_port() == Some(port))
        .cloned()
        .collect()
}
