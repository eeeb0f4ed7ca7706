// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Outgoing-message and credential validation
//!
//! Everything here is a cheap local check that runs before any network
//! work starts.

/// Default ceiling for outgoing message length, in characters
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 10_000;

/// Minimum plausible credential length
const MIN_CREDENTIAL_CHARS: usize = 16;

/// Result of validating an outgoing draft
///
/// Exactly one variant applies to any text: blank-only text is `Empty`,
/// text over the limit is `TooLong`, everything else is `Valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageValidation {
    /// Ready to send
    Valid,
    /// Blank or whitespace-only
    Empty,
    /// Exceeds the character limit
    TooLong { length: usize, limit: usize },
}

impl MessageValidation {
    /// Whether the draft may be sent
    pub fn is_valid(&self) -> bool {
        matches!(self, MessageValidation::Valid)
    }
}

/// Validate an outgoing draft against a character limit
pub fn validate_message(text: &str, limit: usize) -> MessageValidation {
    if text.trim().is_empty() {
        return MessageValidation::Empty;
    }
    let length = text.chars().count();
    if length > limit {
        return MessageValidation::TooLong { length, limit };
    }
    MessageValidation::Valid
}

/// Fast local screen for a stored API credential
///
/// Catches obviously broken keys (truncated paste, embedded whitespace)
/// before a request is attempted. Not a validity proof.
pub fn credential_looks_valid(credential: &str) -> bool {
    let trimmed = credential.trim();
    trimmed.chars().count() >= MIN_CREDENTIAL_CHARS
        && trimmed.chars().all(|c| c.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_empty() {
        assert_eq!(
            validate_message("", DEFAULT_MAX_MESSAGE_CHARS),
            MessageValidation::Empty
        );
        assert_eq!(
            validate_message("   \n\t ", DEFAULT_MAX_MESSAGE_CHARS),
            MessageValidation::Empty
        );
    }

    #[test]
    fn test_validate_too_long() {
        let text = "x".repeat(DEFAULT_MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            validate_message(&text, DEFAULT_MAX_MESSAGE_CHARS),
            MessageValidation::TooLong {
                length: DEFAULT_MAX_MESSAGE_CHARS + 1,
                limit: DEFAULT_MAX_MESSAGE_CHARS,
            }
        );
    }

    #[test]
    fn test_validate_at_limit_is_valid() {
        let text = "x".repeat(DEFAULT_MAX_MESSAGE_CHARS);
        assert!(validate_message(&text, DEFAULT_MAX_MESSAGE_CHARS).is_valid());
    }

    #[test]
    fn test_validate_ordinary_message() {
        assert!(validate_message("Hello there", DEFAULT_MAX_MESSAGE_CHARS).is_valid());
    }

    #[test]
    fn test_credential_format() {
        assert!(credential_looks_valid("sk-or-v1-0123456789abcdef"));
        assert!(credential_looks_valid("  sk-or-v1-0123456789abcdef  "));
        assert!(!credential_looks_valid(""));
        assert!(!credential_looks_valid("short-key"));
        assert!(!credential_looks_valid("sk-or v1 0123456789abcdef"));
        assert!(!credential_looks_valid("sk-or-v1-0123456789ábcdef"));
    }

    proptest! {
        // Exactly one validation outcome applies to any text.
        #[test]
        fn prop_validation_exhaustive_and_exclusive(text in ".*") {
            let outcome = validate_message(&text, DEFAULT_MAX_MESSAGE_CHARS);
            let blank = text.trim().is_empty();
            let over = text.chars().count() > DEFAULT_MAX_MESSAGE_CHARS;
            match outcome {
                MessageValidation::Empty => prop_assert!(blank),
                MessageValidation::TooLong { length, limit } => {
                    prop_assert!(!blank && over);
                    prop_assert_eq!(length, text.chars().count());
                    prop_assert_eq!(limit, DEFAULT_MAX_MESSAGE_CHARS);
                }
                MessageValidation::Valid => prop_assert!(!blank && !over),
            }
        }
    }
}
