//! Identifier validation for instance ids and usernames.
//!
//! Both end up inside store keys (`playerIndex:{instance}:{username}` and
//! friends), so the key separator and control characters are refused.

use thiserror::Error;

pub const MAX_INSTANCE_ID_LEN: usize = 64;
pub const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("{what} cannot be empty")]
    Empty { what: &'static str },

    #[error("{what} is too long (maximum {max} characters)")]
    TooLong { what: &'static str, max: usize },

    #[error("{what} cannot start or end with whitespace")]
    InvalidWhitespace { what: &'static str },

    #[error("{what} contains invalid characters: {chars}")]
    InvalidCharacters { what: &'static str, chars: String },
}

fn invalid_chars(s: &str, allowed: impl Fn(char) -> bool) -> Option<String> {
    let mut bad: Vec<char> = s.chars().filter(|c| !allowed(*c)).collect();
    if bad.is_empty() {
        return None;
    }
    bad.sort_unstable();
    bad.dedup();
    Some(
        bad.into_iter()
            .map(|c| {
                if c.is_control() {
                    format!("\\u{{{:04x}}}", c as u32)
                } else {
                    c.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Instance ids are ASCII letters, digits, `_` and `-` (uuids qualify).
pub fn validate_instance_id(id: &str) -> Result<&str, IdentifierError> {
    const WHAT: &str = "instance id";
    if id.is_empty() {
        return Err(IdentifierError::Empty { what: WHAT });
    }
    if id.chars().count() > MAX_INSTANCE_ID_LEN {
        return Err(IdentifierError::TooLong {
            what: WHAT,
            max: MAX_INSTANCE_ID_LEN,
        });
    }
    if let Some(chars) = invalid_chars(id, |c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(IdentifierError::InvalidCharacters { what: WHAT, chars });
    }
    Ok(id)
}

/// Usernames come from the host platform, so anything printable goes except
/// the key separator `:`.
pub fn validate_username(name: &str) -> Result<&str, IdentifierError> {
    const WHAT: &str = "username";
    if name.trim().is_empty() {
        return Err(IdentifierError::Empty { what: WHAT });
    }
    if name.trim() != name {
        return Err(IdentifierError::InvalidWhitespace { what: WHAT });
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(IdentifierError::TooLong {
            what: WHAT,
            max: MAX_USERNAME_LEN,
        });
    }
    if let Some(chars) = invalid_chars(name, |c| !c.is_control() && c != ':') {
        return Err(IdentifierError::InvalidCharacters { what: WHAT, chars });
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids() {
        assert!(validate_instance_id("p1").is_ok());
        assert!(validate_instance_id("3f2b8c1e-8a44-4c1b-9a55-0c8f2d7e6b10").is_ok());
        assert_eq!(
            validate_instance_id(""),
            Err(IdentifierError::Empty { what: "instance id" })
        );
        assert!(matches!(
            validate_instance_id("post:1"),
            Err(IdentifierError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            validate_instance_id(&"x".repeat(65)),
            Err(IdentifierError::TooLong { max: 64, .. })
        ));
    }

    #[test]
    fn usernames() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("José María").is_ok());
        assert!(validate_username("🚀_rocket").is_ok());
        assert!(matches!(
            validate_username(" alice"),
            Err(IdentifierError::InvalidWhitespace { .. })
        ));
        assert!(matches!(
            validate_username("a:b"),
            Err(IdentifierError::InvalidCharacters { ref chars, .. }) if chars == ":"
        ));
        let err = validate_username("bad\nname").expect_err("control");
        assert!(err.to_string().contains("\\u{000a}"));
    }
}
