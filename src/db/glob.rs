//! Hostmask glob matching.
//!
//! Matching is kept apart from storage so the recognition rules can be
//! exercised against plain hostmask lists. Patterns support `*` (any
//! sequence, including empty) and `?` (exactly one character). Comparison is
//! case-sensitive.
//!
//! Stored hostmask columns are the patterns and the queried identity parts
//! are the literals. A queried part of exactly `*` leaves its column
//! unconstrained, which is how "list everything" queries are expressed.

use super::users::{Hostmask, User};
use std::collections::HashSet;

/// Match `text` against a glob `pattern`.
///
/// # Examples
///
/// ```
/// use purplebot::db::glob::glob_match;
///
/// assert!(glob_match("*", "anything"));
/// assert!(glob_match("te?t", "test"));
/// assert!(glob_match("*.example.com", "user.example.com"));
/// assert!(!glob_match("TEST", "test"));
/// ```
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_chars(&pattern, &text)
}

fn glob_match_chars(pattern: &[char], text: &[char]) -> bool {
    let mut p = 0;
    let mut t = 0;
    // Position after the last '*' seen, and the text position it was tried at.
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}

/// Wildcard accepted in place of a queried identity part.
pub const ANY: &str = "*";

fn column_matches(pattern: &str, value: &str) -> bool {
    value == ANY || glob_match(pattern, value)
}

/// Whether all three patterns of `hostmask` match the given identity.
pub fn hostmask_matches(hostmask: &Hostmask, nickname: &str, username: &str, hostname: &str) -> bool {
    column_matches(&hostmask.nickname, nickname)
        && column_matches(&hostmask.username, username)
        && column_matches(&hostmask.hostname, hostname)
}

/// Collect the users owning at least one matching hostmask.
///
/// Each user appears once, in the order of its first matching hostmask.
pub fn match_users<'a, I>(entries: I, nickname: &str, username: &str, hostname: &str) -> Vec<User>
where
    I: IntoIterator<Item = &'a (User, Hostmask)>,
{
    let mut seen = HashSet::new();
    let mut users = Vec::new();

    for (user, hostmask) in entries {
        if !hostmask_matches(hostmask, nickname, username, hostname) {
            continue;
        }
        if let Some(id) = user.id
            && !seen.insert(id)
        {
            continue;
        }
        users.push(user.clone());
    }

    users
}

/// Resolve an authorization decision from a match result.
///
/// Only an unambiguous match on a single admin grants access.
pub fn is_sole_admin(matches: &[User]) -> bool {
    match matches {
        [user] => user.admin,
        _ => false,
    }
}
