//! Error types shared by every acquisition adapter.
//!
//! `NetError` is the typed cause an adapter returns. `ErrorReport` wraps any
//! error (typed or bubbling up from a library) with a classified kind, a
//! context message and the moment it was captured, and knows how to phrase
//! itself for a user.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::records::IpFamily;

pub const MSG_TRY_AGAIN: &str = "Please try again or check your network configuration";
pub const MSG_PERMISSION_DENIED: &str =
    "Permission denied - some features may require elevated privileges";
pub const MSG_NETWORK_UNAVAILABLE: &str = "Network is not available";
pub const MSG_FEATURE_UNAVAILABLE: &str = "This feature is not available on your system";
pub const MSG_PARSE_FAILED: &str = "Data parsing error - please try again";
pub const MSG_INVALID_INPUT: &str = "Invalid input provided";

const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NetError {
    #[error("command `{program}` timed out after {timeout:?}")]
    CommandTimeout { program: String, timeout: Duration },

    #[error("command `{program}` failed: {reason}")]
    CommandFailed {
        program: String,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no default {} gateway found", family_label(.family))]
    NoGatewayFound { family: Option<IpFamily> },

    #[error("no routing information available")]
    NoRoutesFound,

    #[error("{0} is not implemented on this platform")]
    NotImplemented(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("socket enumeration failed: {0}")]
    Collection(String),

    #[error("request to {url} failed: {detail}")]
    Http { url: String, detail: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{operation} exceeded its deadline of {deadline:?}")]
    Deadline {
        operation: &'static str,
        deadline: Duration,
    },
}

fn family_label(family: &Option<IpFamily>) -> String {
    match family {
        Some(f) => f.to_string(),
        None => "IPv4/IPv6".to_string(),
    }
}

impl NetError {
    pub fn parse(what: &'static str, detail: impl fmt::Display) -> Self {
        NetError::Parse {
            what,
            detail: detail.to_string(),
        }
    }

    pub fn spawn(program: &str, source: std::io::Error) -> Self {
        NetError::CommandFailed {
            program: program.to_string(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Kind of a typed cause. Causes that wrap free text (socket enumeration,
    /// HTTP) still look at the text so a permission problem is reported as one.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::CommandTimeout { .. } | NetError::Deadline { .. } => ErrorKind::Timeout,
            NetError::CommandFailed { source: Some(e), .. }
                if e.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                ErrorKind::Permission
            }
            NetError::CommandFailed { reason, .. } => {
                match ErrorKind::from_message(reason) {
                    ErrorKind::Permission => ErrorKind::Permission,
                    _ => ErrorKind::Command,
                }
            }
            NetError::NotImplemented(_) => ErrorKind::Command,
            NetError::Parse { .. } => ErrorKind::Parse,
            NetError::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::Permission
            }
            NetError::Io { .. } => ErrorKind::Unknown,
            NetError::NoGatewayFound { .. } | NetError::NoRoutesFound | NetError::NotFound(_) => {
                ErrorKind::Unknown
            }
            NetError::Collection(msg) => ErrorKind::from_message(msg),
            NetError::Http { detail, .. } => match ErrorKind::from_message(detail) {
                ErrorKind::Unknown => ErrorKind::Network,
                kind => kind,
            },
            NetError::Validation(_) => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Permission,
    Command,
    Parse,
    Validation,
    Unknown,
}

impl ErrorKind {
    /// Classify any error. Typed causes anywhere in the chain win; otherwise
    /// the rendered message is inspected.
    pub fn classify(err: &anyhow::Error) -> Self {
        if let Some(net) = err.chain().find_map(|e| e.downcast_ref::<NetError>()) {
            return net.kind();
        }
        Self::from_message(&format!("{:#}", err))
    }

    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if contains_any(&lower, &["timeout", "timed out", "deadline exceeded"]) {
            ErrorKind::Timeout
        } else if contains_any(
            &lower,
            &["permission denied", "access denied", "not permitted", "access is denied"],
        ) {
            ErrorKind::Permission
        } else if contains_any(&lower, &["network", "connection", "unreachable"]) {
            ErrorKind::Network
        } else {
            ErrorKind::Unknown
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Network)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// An error captured at the presentation boundary.
#[derive(Debug)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: anyhow::Error,
    pub captured_at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        let cause = cause.into();
        Self {
            kind: ErrorKind::classify(&cause),
            message: message.into(),
            cause,
            captured_at: Utc::now(),
        }
    }

    pub fn should_retry(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Timeout => format!("{} (Operation timed out)", MSG_TRY_AGAIN),
            ErrorKind::Permission => MSG_PERMISSION_DENIED.to_string(),
            ErrorKind::Network => MSG_NETWORK_UNAVAILABLE.to_string(),
            ErrorKind::Command => MSG_FEATURE_UNAVAILABLE.to_string(),
            ErrorKind::Parse => MSG_PARSE_FAILED.to_string(),
            ErrorKind::Validation => MSG_INVALID_INPUT.to_string(),
            ErrorKind::Unknown => {
                let text = format!("{:#}", self.cause).to_lowercase();
                if text.contains("no such host") {
                    "Host not found - check the hostname or DNS settings".to_string()
                } else if text.contains("connection refused") {
                    "Connection refused - the service may not be running".to_string()
                } else if let Some(NetError::NoGatewayFound { .. }) =
                    self.cause.downcast_ref::<NetError>()
                {
                    "No default gateway found".to_string()
                } else if let Some(NetError::NoRoutesFound) = self.cause.downcast_ref::<NetError>() {
                    "No routing information available".to_string()
                } else {
                    MSG_TRY_AGAIN.to_string()
                }
            }
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.message, self.cause)
    }
}

/// Delay before retry number `attempt`: linear in the attempt count, capped.
pub fn retry_delay(attempt: u32) -> Duration {
    if attempt == 0 {
        return RETRY_BASE_DELAY;
    }
    (RETRY_BASE_DELAY * attempt).min(RETRY_MAX_DELAY)
}

/// Run `op` up to `max_retries + 1` times, retrying only timeout and network
/// failures.
pub async fn retry<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T, NetError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries && e.kind().is_retryable() => {
                attempt += 1;
                let delay = retry_delay(attempt);
                debug!(error = %e, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn typed_causes_map_to_kinds() {
        let timeout = NetError::CommandTimeout {
            program: "ping".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(NetError::parse("json", "eof").kind(), ErrorKind::Parse);
        assert_eq!(
            NetError::Validation("bad".into()).kind(),
            ErrorKind::Validation
        );
        let denied = NetError::spawn(
            "ss",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(denied.kind(), ErrorKind::Permission);
        let missing = NetError::spawn(
            "ip",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        );
        assert_eq!(missing.kind(), ErrorKind::Command);
        assert_eq!(
            NetError::Collection("Permission denied (os error 13)".into()).kind(),
            ErrorKind::Permission
        );
    }

    #[test]
    fn untyped_errors_are_classified_by_message() {
        let err = anyhow::anyhow!("operation deadline exceeded");
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Timeout);
        let err = anyhow::anyhow!("open /proc/1/fd: Permission denied");
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Permission);
        let err = anyhow::anyhow!("network is unreachable");
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Network);
        let err = anyhow::anyhow!("something odd");
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Unknown);
    }

    #[test]
    fn typed_cause_found_through_context() {
        let err = anyhow::Error::new(NetError::Validation("host".into())).context("pinging");
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Validation);
    }

    #[test]
    fn only_timeout_and_network_retry() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Network.is_retryable());
        assert!(!ErrorKind::Permission.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Parse.is_retryable());
    }

    #[test]
    fn retry_delay_is_linear_and_capped() {
        assert_eq!(retry_delay(0), Duration::from_secs(1));
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(3), Duration::from_secs(3));
        assert_eq!(retry_delay(10), Duration::from_secs(10));
        assert_eq!(retry_delay(50), Duration::from_secs(10));
    }

    #[test]
    fn user_messages_hide_raw_text() {
        let report = ErrorReport::new(
            "Failed to retrieve network connections",
            NetError::Collection("EACCES: permission denied".into()),
        );
        assert_eq!(report.kind, ErrorKind::Permission);
        assert_eq!(report.user_message(), MSG_PERMISSION_DENIED);

        let report = ErrorReport::new("ping", anyhow::anyhow!("lookup: no such host"));
        assert!(report.user_message().starts_with("Host not found"));

        let report = ErrorReport::new("gw", NetError::NoGatewayFound { family: None });
        assert_eq!(report.user_message(), "No default gateway found");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), NetError> = retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(NetError::Validation("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_retries_timeouts_up_to_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), NetError> = retry(2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(NetError::CommandTimeout {
                    program: "ip".into(),
                    timeout: Duration::from_secs(1),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(NetError::CommandTimeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
