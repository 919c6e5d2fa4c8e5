//! Manager environment block validation and merging.
//!
//! `SetEnvironment` takes `NAME=value` assignments, `UnsetEnvironment` takes
//! bare names or exact assignments. Both lists are validated as a whole
//! before anything is applied.

use std::collections::HashSet;

/// Longest accepted assignment, in bytes.
pub const MAX_ASSIGNMENT_LEN: usize = 32 * 1024;

/// `[A-Za-z_][A-Za-z0-9_]*`
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'_' => {}
        _ => return false,
    }
    name.len() <= MAX_ASSIGNMENT_LEN && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn is_valid_value(value: &str) -> bool {
    value
        .chars()
        .all(|c| !c.is_control() || c == '\n' || c == '\t')
}

/// `NAME=value` with a valid name and printable value.
#[must_use]
pub fn is_valid_assignment(assignment: &str) -> bool {
    let Some((name, value)) = assignment.split_once('=') else {
        return false;
    };
    assignment.len() <= MAX_ASSIGNMENT_LEN && is_valid_name(name) && is_valid_value(value)
}

/// Every entry is a valid assignment and no name is assigned twice.
#[must_use]
pub fn assignments_are_valid(assignments: &[String]) -> bool {
    let mut seen = HashSet::new();
    assignments.iter().all(|a| {
        is_valid_assignment(a) && a.split_once('=').is_some_and(|(name, _)| seen.insert(name))
    })
}

/// Every entry is a valid name or a valid assignment, without repeats.
#[must_use]
pub fn names_or_assignments_are_valid(entries: &[String]) -> bool {
    let mut seen = HashSet::new();
    entries.iter().all(|e| {
        (is_valid_name(e) || is_valid_assignment(e)) && seen.insert(e.as_str())
    })
}

/// A bare name matches any assignment of that name; an assignment only
/// matches itself.
fn matches(entry: &str, pattern: &str) -> bool {
    if pattern.contains('=') {
        entry == pattern
    } else {
        entry
            .strip_prefix(pattern)
            .is_some_and(|rest| rest.starts_with('='))
    }
}

fn name_of(assignment: &str) -> &str {
    assignment.split_once('=').map_or(assignment, |(n, _)| n)
}

/// New environment block: entries matched by `minus` are dropped, entries
/// whose name is reassigned in `plus` are dropped, then `plus` is appended
/// in order.
#[must_use]
pub fn apply(current: &[String], minus: &[String], plus: &[String]) -> Vec<String> {
    let replaced: HashSet<&str> = plus.iter().map(|a| name_of(a)).collect();

    current
        .iter()
        .filter(|entry| !minus.iter().any(|m| matches(entry, m)))
        .filter(|entry| !replaced.contains(name_of(entry)))
        .chain(plus.iter())
        .cloned()
        .collect()
}
