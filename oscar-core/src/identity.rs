//! Screen-name identity.
//!
//! [`IdentityKey`] is the canonical, opaque form of a user identifier.
//! It is constructed only through [`IdentityKey::from_display`] or
//! [`IdentityKey::from_uin`] so that two call sites can never accidentally
//! compare a raw display string against a normalized key.

use std::fmt;

use crate::error::IdentityError;

pub const UIN_MIN: i64 = 10_000;
pub const UIN_MAX: i64 = 2_147_483_646;

/// The user-supplied rendering: mixed case, spaces allowed.
pub type DisplayName = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Normalize a display string into its identity key: lowercase,
    /// whitespace stripped. Does not validate AIM handle format; use
    /// [`validate_aim_handle`] at creation time for that.
    pub fn from_display(display: &str) -> IdentityKey {
        let normalized: String = display
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(|c| c.to_lowercase())
            .collect();
        IdentityKey(normalized)
    }

    /// ICQ users are identified by a decimal UIN; the identity key is
    /// just its decimal rendering (no case/whitespace ambiguity possible).
    pub fn from_uin(uin: i64) -> Result<IdentityKey, IdentityError> {
        if !(UIN_MIN..=UIN_MAX).contains(&uin) {
            return Err(IdentityError::UinOutOfRange(uin));
        }
        Ok(IdentityKey(uin.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// AIM handle validation: 3-16 non-space characters, does not begin
/// with a digit, no trailing space, only `[A-Za-z0-9 ]`.
pub fn validate_aim_handle(display: &str) -> Result<(), IdentityError> {
    let non_space_count = display.chars().filter(|c| *c != ' ').count();
    if !(3..=16).contains(&non_space_count) {
        return Err(IdentityError::AimHandleLength);
    }
    if display.ends_with(' ') {
        return Err(IdentityError::AimHandleInvalidFormat);
    }
    if display
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
    {
        return Err(IdentityError::AimHandleInvalidFormat);
    }
    if !display
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ')
    {
        return Err(IdentityError::AimHandleInvalidFormat);
    }
    Ok(())
}

/// Parse a display string as a decimal ICQ UIN, if it looks like one.
pub fn as_uin(display: &str) -> Option<i64> {
    if display.is_empty() || !display.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    display.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_normalizes_case_and_whitespace() {
        let a = IdentityKey::from_display("SuperUser");
        let b = IdentityKey::from_display(" Super User ");
        let c = IdentityKey::from_display("super  user");
        assert_eq!(a, IdentityKey::from_display("superuser"));
        assert_eq!(b.as_str(), "superuser");
        assert_eq!(c.as_str(), "superuser");
    }

    #[test]
    fn aim_handle_validation() {
        assert!(validate_aim_handle("Abc").is_ok());
        assert!(validate_aim_handle("ab").is_err()); // too short
        assert!(validate_aim_handle("1abc").is_err()); // leading digit
        assert!(validate_aim_handle("abc ").is_err()); // trailing space
        assert!(validate_aim_handle("abc!").is_err()); // bad char
        assert!(validate_aim_handle(&"a".repeat(17)).is_err()); // too long
        assert!(validate_aim_handle("a b c").is_ok());
    }

    #[test]
    fn uin_range() {
        assert!(IdentityKey::from_uin(9_999).is_err());
        assert!(IdentityKey::from_uin(10_000).is_ok());
        assert!(IdentityKey::from_uin(2_147_483_646).is_ok());
        assert!(IdentityKey::from_uin(2_147_483_647).is_err());
    }

    #[test]
    fn as_uin_rejects_non_numeric() {
        assert_eq!(as_uin("12345"), Some(12345));
        assert_eq!(as_uin("abc"), None);
        assert_eq!(as_uin(""), None);
    }
}
