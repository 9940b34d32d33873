//! CLI output helpers: every command renders either human-readable text or
//! JSON from the same output struct.

use serde::Serialize;

/// A command result that can render itself for humans.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
}

/// Print a command output in the selected mode.
pub fn output<T: CommandOutput>(value: &T, json: bool) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to serialize output: {e}"),
        }
    } else {
        println!("{}", value.to_human());
    }
}

/// Truncate a string for table display.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len.saturating_sub(3)])
    }
}
