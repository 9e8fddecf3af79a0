// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adaptive iteration and thinking budgets, plus tool-result truncation.
//!
//! All pure. Simple error classes get short loops; database and
//! infrastructure classes get longer ones. Thinking shrinks linearly
//! after the first two iterations.

/// Error classes that usually resolve in a few file reads.
const SIMPLE_CLASSES: [&str; 6] = [
    "nomethoderror",
    "nameerror",
    "argumenterror",
    "typeerror",
    "keyerror",
    "attributeerror",
];

/// Authorization noise; rarely worth a deep loop.
const AUTH_CLASSES: [&str; 4] = ["notauthorized", "forbidden", "authentication", "unauthorized"];

/// Database errors; schema and query chasing takes longer.
const DATABASE_CLASSES: [&str; 5] = ["activerecord", "pg::", "statementinvalid", "deadlock", "mysql"];

/// Infrastructure-level failures; the widest investigations.
const COMPLEX_CLASSES: [&str; 5] = [
    "systemstackerror",
    "timeout",
    "connectionerror",
    "nomemoryerror",
    "segfault",
];

fn matches_any(error_class: &str, needles: &[&str]) -> bool {
    let lowered = error_class.to_lowercase();
    needles.iter().any(|n| lowered.contains(n))
}

/// Iteration budget for an error class, clamped by the configured
/// ceiling. Monotonically non-decreasing in `ceiling`.
pub fn max_iterations(error_class: &str, ceiling: u32) -> u32 {
    let base = if matches_any(error_class, &SIMPLE_CLASSES) {
        7
    } else if matches_any(error_class, &AUTH_CLASSES) {
        5
    } else if matches_any(error_class, &DATABASE_CLASSES) {
        10
    } else if matches_any(error_class, &COMPLEX_CLASSES) {
        15
    } else {
        10
    };
    base.min(ceiling)
}

/// Thinking-token budget for iteration `i` (1-based).
///
/// The base depends on the class family; from iteration 3 on it scales
/// down linearly to 25% at the final iteration, floored at 2000.
pub fn thinking_budget(i: u32, max_iterations: u32, error_class: &str) -> u32 {
    let base: f64 = if matches_any(error_class, &SIMPLE_CLASSES) {
        4_000.0
    } else if matches_any(error_class, &COMPLEX_CLASSES) {
        12_000.0
    } else {
        8_000.0
    };

    let scale = if i <= 2 || max_iterations <= 2 {
        1.0
    } else {
        1.0 - 0.75 * ((i - 2) as f64 / (max_iterations - 2) as f64)
    };

    ((base * scale).round() as u32).max(2_000)
}

/// Byte cap for a tool's result text.
pub fn tool_result_cap(tool_name: &str) -> usize {
    match tool_name {
        "read_file" => 8_000,
        "search_code" => 4_000,
        "list_directory" => 2_000,
        "get_error_traces" => 4_000,
        _ => 4_000,
    }
}

/// Cap a tool result, keeping the head and tail halves and replacing the
/// middle with a marker naming the dropped byte count.
pub fn truncate_tool_result(tool_name: &str, text: &str) -> String {
    let cap = tool_result_cap(tool_name);
    if text.len() <= cap {
        return text.to_string();
    }

    let half = cap / 2;
    let head_end = floor_char_boundary(text, half);
    let tail_start = ceil_char_boundary(text, text.len() - half);
    let dropped = tail_start - head_end;

    format!(
        "{}\n... [truncated {dropped} bytes] ...\n{}",
        &text[..head_end],
        &text[tail_start..]
    )
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
