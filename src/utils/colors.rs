/// ANSI color helper utilities for terminal output.
use crate::models::sync_run::RunStatus;

pub const RESET: &str = "\x1b[0m";

pub const GREY: &str = "\x1b[90m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

pub fn color_for_status(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => GREEN,
        RunStatus::Partial => YELLOW,
        RunStatus::Failed => RED,
    }
}

/// Grey placeholder for empty cells ("" or "--").
pub fn colorize_optional(value: &str) -> String {
    if value.trim().is_empty() || value.trim() == "--" {
        format!("{GREY}--{RESET}")
    } else {
        value.to_string()
    }
}
