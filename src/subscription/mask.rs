//! Positional masks filtering publications.
//!
//! Publishers stamp each message with a fixed-length mask; subscribers
//! register a mask of the same length where `%` matches any single
//! character. Both kinds must be non-empty printable ASCII.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Single-position wildcard allowed in subscription masks.
pub const WILDCARD: u8 = b'%';

/// Reasons a mask is rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask is empty")]
    Empty,
    #[error("mask contains a non-printable character at position {position}")]
    NonPrintable { position: usize },
    #[error("wildcard at position {position} is not allowed in a message mask")]
    WildcardInMessageMask { position: usize },
}

/// Validated subscription mask.
///
/// # Examples
///
/// ```
/// use service_connector::subscription::SubscriptionMask;
///
/// let mask = SubscriptionMask::new("AB%D").expect("valid mask");
/// assert!(mask.matches("ABCD"));
/// assert!(!mask.matches("ABC"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionMask(String);

impl SubscriptionMask {
    /// Validate `mask` as a subscription mask.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError`] for empty masks and non-printable characters.
    pub fn new(mask: impl Into<String>) -> Result<Self, MaskError> {
        let mask = mask.into();
        check_printable(&mask)?;
        Ok(Self(mask))
    }

    /// Borrow the mask text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }

    /// Mask length in characters.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Always `false`; validated masks are non-empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Whether a publication stamped with `message_mask` passes this filter.
    ///
    /// Masks of different lengths never match.
    #[must_use]
    pub fn matches(&self, message_mask: &str) -> bool {
        let pattern = self.0.as_bytes();
        let candidate = message_mask.as_bytes();
        pattern.len() == candidate.len()
            && pattern
                .iter()
                .zip(candidate)
                .all(|(p, c)| *p == WILDCARD || p == c)
    }
}

impl fmt::Display for SubscriptionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for SubscriptionMask {
    type Error = MaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<SubscriptionMask> for String {
    fn from(mask: SubscriptionMask) -> Self { mask.0 }
}

/// Check a publisher's mask.
///
/// # Errors
///
/// Returns [`MaskError`] for empty masks, non-printable characters and
/// wildcards.
pub fn validate_message_mask(mask: &str) -> Result<(), MaskError> {
    check_printable(mask)?;
    match mask.bytes().position(|b| b == WILDCARD) {
        Some(position) => Err(MaskError::WildcardInMessageMask { position }),
        None => Ok(()),
    }
}

fn check_printable(mask: &str) -> Result<(), MaskError> {
    if mask.is_empty() {
        return Err(MaskError::Empty);
    }
    match mask.bytes().position(|b| !(0x20..=0x7e).contains(&b)) {
        Some(position) => Err(MaskError::NonPrintable { position }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{MaskError, SubscriptionMask, validate_message_mask};

    #[rstest]
    #[case("ABCD", "ABCD", true)]
    #[case("A%CD", "AXCD", true)]
    #[case("%%%%", "WXYZ", true)]
    #[case("A%CD", "AXCE", false)]
    #[case("ABCD", "ABC", false)]
    #[case("ABC", "ABCD", false)]
    fn matching(#[case] pattern: &str, #[case] message: &str, #[case] expected: bool) {
        let mask = SubscriptionMask::new(pattern).expect("valid mask");
        assert_eq!(mask.matches(message), expected);
    }

    #[test]
    fn empty_mask_is_rejected() {
        assert_eq!(SubscriptionMask::new(""), Err(MaskError::Empty));
    }

    #[test]
    fn control_characters_are_rejected() {
        assert_eq!(
            SubscriptionMask::new("AB\tD"),
            Err(MaskError::NonPrintable { position: 2 })
        );
        assert_eq!(
            SubscriptionMask::new("ABÄ"),
            Err(MaskError::NonPrintable { position: 2 })
        );
    }

    #[test]
    fn wildcard_only_in_subscription_masks() {
        assert!(SubscriptionMask::new("A%").is_ok());
        assert_eq!(
            validate_message_mask("A%"),
            Err(MaskError::WildcardInMessageMask { position: 1 })
        );
        assert!(validate_message_mask("AB").is_ok());
    }
}
