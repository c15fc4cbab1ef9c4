//! Action-item extraction from free-text guidance

use regex::Regex;
use std::sync::LazyLock;

/// Upper bound on extracted action items
pub const MAX_ACTION_ITEMS: usize = 10;

const KEYWORD_PREFIXES: [&str; 3] = ["Action:", "TODO:", "Next:"];

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.").expect("NUMBERED_LINE regex should compile"));

/// Whether a trimmed line reads as an actionable item
pub fn is_action_line(line: &str) -> bool {
    NUMBERED_LINE.is_match(line)
        || line.starts_with('-')
        || line.starts_with('*')
        || KEYWORD_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Pull actionable lines out of guidance text, in order, capped at ten.
pub fn extract_action_items(guidance: &str) -> Vec<String> {
    guidance
        .lines()
        .map(str::trim)
        .filter(|line| is_action_line(line))
        .take(MAX_ACTION_ITEMS)
        .map(str::to_string)
        .collect()
}
