//! Console command replies
//!
//! The console endpoint answers with JSON when the firmware is happy and with
//! raw terminal text otherwise. A failed command looks like:
//!
//! ```text
//! esp32> sched_set 3 -s 9000
//! Setpoint exceeds rated power
//! Command 'sched_set' returned non-zero error code: 0x2 (ERROR)
//! ```

use crate::error::{HomevoltError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

const ERROR_MARKER: &str = "returned non-zero error code";
const PROMPT_PREFIX: &str = "esp32>";

/// Result of one console command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub output: String,
    pub exit_code: i64,
    /// Any additional fields the firmware includes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandResult {
    pub fn plain(command: &str, output: &str) -> Self {
        Self {
            command: command.to_string(),
            output: output.trim().to_string(),
            exit_code: 0,
            extra: Map::new(),
        }
    }

    /// Map a JSON reply without rejecting odd field shapes
    ///
    /// Missing or null fields take their defaults, `exit_code` may be a
    /// numeric string, and a non-string `output` is kept as its JSON text.
    pub fn from_json(command: &str, mut object: Map<String, Value>) -> Self {
        let reply_command = match object.remove("command") {
            Some(Value::String(s)) => s,
            _ => command.to_string(),
        };
        let output = match object.remove("output") {
            Some(Value::String(s)) => s,
            None | Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
        };
        let exit_code = object.remove("exit_code").map_or(0, |v| lenient_exit_code(&v));
        Self {
            command: reply_command,
            output,
            exit_code,
            extra: object,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_exit_code(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// Interpret a 2xx console body for `command`
pub fn parse_console_response(command: &str, body: &str) -> Result<CommandResult> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) {
        return Ok(CommandResult::from_json(command, object));
    }

    if body.contains(ERROR_MARKER) {
        return Err(HomevoltError::command(extract_error_message(body)));
    }

    Ok(CommandResult::plain(command, body))
}

/// Lines before the error-code line, minus prompt echoes, joined with single spaces
fn extract_error_message(body: &str) -> String {
    let message = body
        .trim()
        .lines()
        .take_while(|line| !line.contains(ERROR_MARKER))
        .filter(|line| !line.starts_with(PROMPT_PREFIX))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if message.is_empty() {
        "Command failed".to_string()
    } else {
        message
    }
}
