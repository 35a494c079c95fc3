// Identifier (slug) grammar shared by processes, providers and I/O ids
//
// Grammar: ^[A-Za-z0-9](?:[A-Za-z0-9_-]{1,}[A-Za-z0-9])?$ with minimum
// length 3, no leading/trailing dash and no embedded double-dash.

use crate::error::{EngineError, Result};
use regex::Regex;
use std::sync::OnceLock;

pub const IDENTIFIER_MIN_LENGTH: usize = 3;
pub const IDENTIFIER_MAX_LENGTH: usize = 64;

fn slug_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9_-]{1,}[A-Za-z0-9])?$").unwrap()
    })
}

/// Check an identifier against the slug grammar without modifying it
pub fn is_valid_identifier(id: &str) -> bool {
    id.len() >= IDENTIFIER_MIN_LENGTH
        && id.len() <= IDENTIFIER_MAX_LENGTH
        && !id.contains("--")
        && slug_regex().is_match(id)
}

/// Validate an identifier in strict mode, returning it unchanged
pub fn validate_identifier(id: &str) -> Result<&str> {
    if is_valid_identifier(id) {
        Ok(id)
    } else {
        Err(EngineError::InvalidIdentifier(id.to_string()))
    }
}

/// Sanitize an identifier in lenient mode.
///
/// Every character outside the slug alphabet is replaced by `_`, then
/// leading/trailing dashes are trimmed and double-dashes collapsed. The
/// result is validated; an input that cannot be repaired (too short once
/// trimmed) is still an error.
pub fn sanitize_identifier(id: &str) -> Result<String> {
    let mut out: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    let out = out.trim_matches('-').to_string();
    if is_valid_identifier(&out) {
        Ok(out)
    } else {
        Err(EngineError::InvalidIdentifier(id.to_string()))
    }
}
