//! Nickname validation.
//!
//! Nicknames are 1 to 24 ASCII letters, digits, or hyphens. This is
//! stricter than RFC 2812 on purpose: the server lower-cases nicknames at
//! registration and compares them as plain ASCII.

/// Maximum nickname length in characters.
pub const NICK_MAX_LEN: usize = 24;

/// Extension trait for checking if a string is an acceptable nickname.
pub trait NickExt {
    /// Check if this string is a valid nickname (`[a-zA-Z0-9-]{1,24}`).
    fn is_valid_nick(&self) -> bool;
}

impl NickExt for &str {
    fn is_valid_nick(&self) -> bool {
        !self.is_empty()
            && self.len() <= NICK_MAX_LEN
            && self.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }
}

impl NickExt for String {
    fn is_valid_nick(&self) -> bool {
        self.as_str().is_valid_nick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_nicks() {
        assert!("alice".is_valid_nick());
        assert!("Alice-42".is_valid_nick());
        assert!("a".is_valid_nick());
        assert!("-dash".is_valid_nick());
        assert!("a".repeat(24).is_valid_nick());
    }

    #[test]
    fn test_invalid_nicks() {
        assert!(!"".is_valid_nick());
        assert!(!"a".repeat(25).is_valid_nick());
        assert!(!"with space".is_valid_nick());
        assert!(!"under_score".is_valid_nick());
        assert!(!"[brackets]".is_valid_nick());
        assert!(!"ünïcode".is_valid_nick());
    }
}
