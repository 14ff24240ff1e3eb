// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use regex::Regex;

/// Convert a path glob to a [`Regex`].
///
/// `**` matches any sequence including `/`; `*` matches any sequence
/// excluding `/`; `?` matches one non-`/` character.  Everything else is
/// literal.
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    re.push_str(".*");
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Whether `text` matches the glob `pattern`.  A pattern without wildcards
/// degenerates to an exact match, which is how tool-name rules behave.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    glob_to_regex(pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
