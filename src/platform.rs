use anyhow::Result;
use std::fmt;
use std::str::FromStr;

use crate::error::NetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOS,
    Linux,
    Windows,
}

impl FromStr for Os {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, NetError> {
        match s {
            "macos" => Ok(Os::MacOS),
            "linux" => Ok(Os::Linux),
            "windows" => Ok(Os::Windows),
            other => Err(NetError::NotImplemented(format!("{} support", other))),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::MacOS => write!(f, "macos"),
            Os::Linux => write!(f, "linux"),
            Os::Windows => write!(f, "windows"),
        }
    }
}

#[derive(Debug)]
pub struct Platform {
    pub os: Os,
    pub hostname: String,
    pub elevated: bool,
    pub is_wsl: bool,
}

pub fn detect() -> Result<Platform> {
    let os: Os = std::env::consts::OS.parse()?;
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let is_wsl = os == Os::Linux && detect_wsl();

    Ok(Platform {
        os,
        hostname,
        elevated: is_elevated(),
        is_wsl,
    })
}

fn detect_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| {
            let lower = v.to_lowercase();
            lower.contains("microsoft") || lower.contains("wsl")
        })
        .unwrap_or(false)
}

/// Whether the process runs as root. Socket-to-process correlation for other
/// users' sockets needs this on Linux and macOS.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_os_names() {
        assert_eq!("linux".parse::<Os>().unwrap(), Os::Linux);
        assert_eq!("windows".parse::<Os>().unwrap(), Os::Windows);
        assert!(matches!(
            "freebsd".parse::<Os>(),
            Err(NetError::NotImplemented(_))
        ));
    }
}
