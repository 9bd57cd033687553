use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::audit::{self, ToolCallRecord};
use crate::error::AppError;
use crate::state::AppState;

use super::{Command, CommandOutput};

/// Execute a Command against the application state.
/// This is the single dispatch point for all surfaces (HTTP API, CLI).
pub fn execute(state: &Arc<AppState>, cmd: Command) -> Result<CommandOutput, AppError> {
    cmd.dispatch(state)
}

/// Parse and execute a named tool call, then record it in the audit log.
pub fn execute_tool_call(
    state: &Arc<AppState>,
    origin: &str,
    name: &str,
    input: &Value,
) -> Result<CommandOutput, AppError> {
    let started = Instant::now();
    let generation = state.logic().generation();
    let result = Command::from_tool_call(name, input).and_then(|cmd| execute(state, cmd));
    let elapsed = started.elapsed();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    let error_text = result.as_ref().err().map(ToString::to_string);
    let outcome = match (&result, &error_text) {
        (Ok(output), _) => Ok(output.message.as_str()),
        (Err(_), Some(text)) => Err(text.as_str()),
        (Err(_), None) => Err(""),
    };
    match &outcome {
        Ok(_) => tracing::info!(tool = name, origin, elapsed_ms, "tool call ok"),
        Err(e) => tracing::warn!(tool = name, origin, error = %e, "tool call failed"),
    }
    audit::log_tool_call(
        &state.app_config_dir,
        &ToolCallRecord {
            origin,
            tool: name,
            input,
            result: outcome,
            logic_generation: generation,
            duration: elapsed,
        },
    );
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeResolve;
    use crate::state::test_support::state_with;
    use serde_json::json;

    #[test]
    fn tool_calls_are_audited() {
        let (state, dir) = state_with(&FakeResolve::new());
        execute_tool_call(&state, "test", "list_timelines", &json!({})).unwrap();
        execute_tool_call(&state, "test", "no_such_tool", &json!({})).unwrap_err();

        let logs = crate::paths::audit_logs_dir(dir.path());
        let file = std::fs::read_dir(logs).unwrap().next().unwrap().unwrap().path();
        let lines: Vec<Value> = std::fs::read_to_string(file)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tool"], "list_timelines");
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[1]["ok"], false);
        assert_eq!(lines[1]["origin"], "test");
    }
}
