//! JSONL audit log of tool executions.
//!
//! Every tool call is appended as one line to
//! `{app_config_dir}/tool-logs/YYYY-MM-DD.jsonl`. Best-effort: never panics
//! or fails the caller.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct ToolAuditEntry<'a> {
    ts: u64,
    /// `"http"`, `"cli"`, ..
    origin: &'a str,
    tool: &'a str,
    input: &'a Value,
    ok: bool,
    message: &'a str,
    logic_generation: u64,
    duration_ms: u64,
}

/// One finished tool execution.
pub struct ToolCallRecord<'a> {
    pub origin: &'a str,
    pub tool: &'a str,
    pub input: &'a Value,
    pub result: Result<&'a str, &'a str>,
    pub logic_generation: u64,
    pub duration: Duration,
}

pub fn log_tool_call(app_config_dir: &Path, record: &ToolCallRecord<'_>) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let (ok, message) = match record.result {
        Ok(msg) => (true, msg),
        Err(e) => (false, e),
    };

    let entry = ToolAuditEntry {
        ts: now,
        origin: record.origin,
        tool: record.tool,
        input: record.input,
        ok,
        message,
        logic_generation: record.logic_generation,
        duration_ms: u64::try_from(record.duration.as_millis()).unwrap_or(u64::MAX),
    };

    let dir = crate::paths::audit_logs_dir(app_config_dir);
    let _ = fs::create_dir_all(&dir);
    let path = dir.join(format!("{}.jsonl", date_from_epoch(now)));

    if let Ok(json) = serde_json::to_string(&entry) {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = writeln!(file, "{json}");
        }
    }
}

/// Format epoch seconds as `YYYY-MM-DD`.
#[allow(clippy::unreadable_literal, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn date_from_epoch(epoch_secs: u64) -> String {
    // Civil date from day count (Howard Hinnant's algorithm).
    let days = (epoch_secs / 86400) as i64;
    let z = days + 719468;
    let era = (if z >= 0 { z } else { z - 146096 }) / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = (yoe as i64) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02}")
}
