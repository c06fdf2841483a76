//! Roster validation and extraction from a numbered role prompt.

use std::collections::HashSet;

use super::errors::SessionError;

/// Trims every role name and checks the roster is usable.
///
/// # Errors
///
/// Returns `SessionError::IncompleteSetup` if the roster is empty, contains a
/// blank name, or repeats a name (compared case-insensitively).
pub fn normalize_roster<S: AsRef<str>>(roles: &[S]) -> Result<Vec<String>, SessionError> {
    if roles.is_empty() {
        return Err(SessionError::IncompleteSetup("roster is empty".into()));
    }

    let mut seen = HashSet::with_capacity(roles.len());
    let mut roster = Vec::with_capacity(roles.len());
    for role in roles {
        let name = role.as_ref().trim();
        if name.is_empty() {
            return Err(SessionError::IncompleteSetup(
                "roster contains a blank role name".into(),
            ));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(SessionError::IncompleteSetup(format!(
                "role {name:?} appears more than once"
            )));
        }
        roster.push(name.to_owned());
    }
    Ok(roster)
}

/// Pulls role names out of a role prompt.
///
/// Only lines shaped like `3. THE HUNTER (HUMAN)` count. The number is
/// dropped and everything from the first `(` on is ignored, so that line
/// yields `THE HUNTER`.
#[must_use]
pub fn extract_roster(role_prompt: &str) -> Vec<String> {
    role_prompt
        .lines()
        .filter_map(|line| numbered_item(line.trim()))
        .map(|item| item.split('(').next().unwrap_or_default().trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Returns the text after `<digits>.<whitespace>`, or `None` if the line is
/// not a numbered item.
fn numbered_item(line: &str) -> Option<&str> {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start())
}
