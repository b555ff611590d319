use serde_json::Value;
use std::time::Duration;

use super::runner::CommandRunner;
use crate::error::NetError;

pub const PROGRAM: &str = "powershell";

/// Run a PowerShell pipeline non-interactively and return its stdout.
pub async fn run(
    runner: &dyn CommandRunner,
    script: &str,
    timeout: Duration,
) -> Result<String, NetError> {
    runner
        .run(
            PROGRAM,
            &["-NoProfile", "-NonInteractive", "-Command", script],
            timeout,
        )
        .await
}

/// Run a pipeline ending in `ConvertTo-Json` and return its objects.
pub async fn query(
    runner: &dyn CommandRunner,
    script: &str,
    timeout: Duration,
    what: &'static str,
) -> Result<Vec<Value>, NetError> {
    let output = run(runner, script, timeout).await?;
    objects(&output, what)
}

/// `ConvertTo-Json` emits a bare object for a single result and an array
/// otherwise; no output at all means no results.
pub fn objects(output: &str, what: &'static str) -> Result<Vec<Value>, NetError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(trimmed).map_err(|e| NetError::parse(what, e))? {
        Value::Array(items) => Ok(items),
        obj @ Value::Object(_) => Ok(vec![obj]),
        other => Err(NetError::parse(what, format!("unexpected JSON value: {}", other))),
    }
}

pub fn str_field<'a>(obj: &'a Value, key: &str) -> &'a str {
    obj.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Numeric field that may arrive as a JSON number or a numeric string.
pub fn u32_field(obj: &Value, key: &str) -> u32 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as u32).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// String field, or an array of strings, flattened into a list.
pub fn str_list(obj: &Value, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
