// Apple Common - shared AppleScript plumbing for Apple app bridges
// Script execution, delimited output parsing, and date exchange.
// Execution is macOS only.

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike, Utc};
#[cfg(target_os = "macos")]
use std::process::Stdio;

use crate::error::ConnectorError;

/// Separates records in script output (ASCII record separator, `character id 30`).
pub const RECORD_SEP: &str = "\u{1e}";
/// Separates fields within a record (ASCII unit separator, `character id 31`).
pub const FIELD_SEP: &str = "\u{1f}";

/// Result of running an AppleScript
#[derive(Debug, Clone)]
pub struct ScriptResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ScriptResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execute an AppleScript fed through stdin and capture its output
#[cfg(target_os = "macos")]
pub async fn run_applescript(script: &str) -> Result<ScriptResult, ConnectorError> {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    let mut cmd = Command::new("/usr/bin/osascript");
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| ConnectorError::AppleScript(format!("Failed to spawn osascript: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|e| ConnectorError::AppleScript(format!("Failed to write script: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ConnectorError::AppleScript(format!("Failed to wait for osascript: {}", e)))?;

    Ok(ScriptResult {
        stdout: String::from_utf8_lossy(&output.stdout)
            .trim_end_matches(&['\r', '\n'][..])
            .to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

#[cfg(not(target_os = "macos"))]
pub async fn run_applescript(_script: &str) -> Result<ScriptResult, ConnectorError> {
    Err(ConnectorError::Unavailable(
        "AppleScript is only available on macOS".to_string(),
    ))
}

/// Execute AppleScript and return stdout, or error if failed
pub async fn run_applescript_output(script: &str) -> Result<String, ConnectorError> {
    let result = run_applescript(script).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(ConnectorError::AppleScript(result.stderr))
    }
}

/// Escape a string for use in an AppleScript string literal
pub fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split `RECORD_SEP`/`FIELD_SEP` delimited output into records of at least `min_fields` fields.
pub fn split_records(output: &str, min_fields: usize) -> Vec<Vec<&str>> {
    output
        .split(RECORD_SEP)
        .filter(|s| !s.trim().is_empty())
        .map(|entry| entry.split(FIELD_SEP).collect::<Vec<_>>())
        .filter(|fields| fields.len() >= min_fields)
        .collect()
}

/// Empty fields and AppleScript's `missing value` both mean absent.
pub fn optional_field(field: &str) -> Option<String> {
    match field.trim() {
        "" | "missing value" => None,
        _ => Some(field.to_string()),
    }
}

/// Handlers appended to scripts that exchange dates. `isoDate` renders a date
/// as local `YYYY-MM-DDTHH:MM:SS`, or "" for `missing value`.
pub const DATE_HANDLERS: &str = r#"
on isoDate(d)
    if d is missing value then return ""
    set s to time of d
    return ((year of d) as string) & "-" & my pad((month of d) as integer) & "-" & my pad(day of d) & "T" & my pad(s div 3600) & ":" & my pad((s mod 3600) div 60) & ":" & my pad(s mod 60)
end isoDate

on pad(n)
    set t to "0" & (n as string)
    return text -2 thru -1 of t
end pad
"#;

/// Statements building a local AppleScript date in `var` from a UTC instant.
/// The day is reset first so month changes never overflow.
pub fn applescript_date_block(var: &str, at: &DateTime<Utc>) -> String {
    let local = at.with_timezone(&Local);
    format!(
        "set {var} to current date\n\
         set day of {var} to 1\n\
         set year of {var} to {year}\n\
         set month of {var} to {month}\n\
         set day of {var} to {day}\n\
         set time of {var} to {seconds}",
        var = var,
        year = local.year(),
        month = local.month(),
        day = local.day(),
        seconds = local.num_seconds_from_midnight(),
    )
}

/// Read an `isoDate` value back as UTC.
pub fn parse_local_iso(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Standard connector capabilities for Apple connectors
pub fn apple_connector_capabilities() -> rmcp::model::ServerCapabilities {
    rmcp::model::ServerCapabilities {
        tools: Some(rmcp::model::ToolsCapability { list_changed: None }),
        ..Default::default()
    }
}
