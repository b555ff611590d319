//! `netinfo config`: print the effective configuration.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::{is_json, print_json};
use crate::config::{self, Config};

/// `source` is the `--config` path when one was given.
pub fn run(cfg: &Config, format: &str, source: Option<&Path>) -> Result<()> {
    if is_json(format) {
        return print_json(cfg);
    }
    let path = match source {
        Some(p) => Ok(p.to_path_buf()),
        None => Config::path(),
    };
    if let Ok(path) = path {
        let state = if path.exists() { "" } else { " (not present)" };
        println!("{}", format!("# {}{}", path.display(), state).dimmed());
    }
    print!("{}", config::to_yaml(cfg)?);
    Ok(())
}
