pub mod config;
pub mod connections;
pub mod connectivity;
pub mod dns;
pub mod gateway;
pub mod interfaces;
pub mod ip;
pub mod ping;
pub mod routes;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;

/// Output formats accepted by `--format`.
pub const FORMATS: [&str; 2] = ["table", "json"];

pub fn check_format(format: &str) -> Result<()> {
    if !FORMATS.contains(&format) {
        bail!(
            "unknown output format '{}' (expected one of: {})",
            format,
            FORMATS.join(", ")
        );
    }
    Ok(())
}

pub fn is_json(format: &str) -> bool {
    format == "json"
}

/// Every acquisition is awaited in turn; one thread is enough.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")
}

pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}

pub fn section(title: &str) {
    println!("{}", format!("── {} ──", title).yellow());
}

/// Pad before colouring; escape codes would otherwise count toward the width.
pub fn padded(value: &str, width: usize) -> String {
    format!("{:<width$}", value)
}

pub fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
