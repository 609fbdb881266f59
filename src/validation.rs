//! Input validation and sanitization for outbound messages.
//!
//! Everything here is pure: no I/O, no clock, no shared state. The handlers
//! call these before any provider request is attempted.

use std::fmt;

use thiserror::Error;

use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length of a freeform message body, in characters.
///
/// Matches the WhatsApp text message limit.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Maximum number of digits in an E.164 number (country code included).
pub const MAX_PHONE_DIGITS: usize = 15;

/// Minimum number of digits accepted in a phone number.
pub const MIN_PHONE_DIGITS: usize = 2;

const PHONE_FORMAT_HINT: &str =
    "Invalid phone number format. Use international format (e.g., +1234567890)";

// =============================================================================
// Phone Numbers
// =============================================================================

/// Check a phone number against the E.164 shape.
///
/// Surrounding whitespace is trimmed and a missing `+` is added before the
/// check. The remainder must be a digit 1-9 followed by 1 to 14 digits.
/// Multiple `+` signs, letters, separators and wrong lengths are rejected.
pub fn validate_phone_number(input: &str) -> bool {
    digits_of(input).is_some()
}

/// The digit part of a valid number, without the leading `+`.
fn digits_of(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let mut chars = digits.chars();
    let first_ok = matches!(chars.next(), Some('1'..='9'));
    let rest_ok = chars.all(|c| c.is_ascii_digit());

    (first_ok && rest_ok && (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()))
        .then_some(digits)
}

/// A phone number that passed [`validate_phone_number`].
///
/// Stored without the `+`; [`as_e164`](Self::as_e164) adds it back for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPhoneNumber(String);

impl NormalizedPhoneNumber {
    /// Normalize and validate caller input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ValidationFailed` when the input is not E.164 shaped.
    pub fn parse(input: &str) -> AppResult<Self> {
        digits_of(input)
            .map(|d| Self(d.to_string()))
            .ok_or_else(|| AppError::ValidationFailed(PHONE_FORMAT_HINT.to_string()))
    }

    /// International form with a leading `+`.
    pub fn as_e164(&self) -> String {
        format!("+{}", self.0)
    }

    /// Form sent to the provider (no leading `+`).
    pub fn as_wire(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedPhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}", self.0)
    }
}

// =============================================================================
// Message Content
// =============================================================================

/// Why a message body was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("Message content cannot be empty")]
    Empty,

    #[error("Message content exceeds maximum length of {MAX_MESSAGE_LENGTH} characters")]
    TooLong,
}

impl From<ContentError> for AppError {
    fn from(err: ContentError) -> Self {
        AppError::ValidationFailed(err.to_string())
    }
}

/// Check a message body's length.
///
/// The input is not trimmed first: a message made only of spaces is
/// non-empty and passes.
pub fn validate_message_content(input: &str) -> Result<(), ContentError> {
    if input.is_empty() {
        return Err(ContentError::Empty);
    }

    if input.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ContentError::TooLong);
    }

    Ok(())
}

/// Neutralize a freeform message before it leaves the service.
///
/// 1. Drops every character below U+0020 (newlines and tabs included).
/// 2. Escapes `<` and `>` as `&lt;` and `&gt;`.
/// 3. Trims surrounding whitespace.
pub fn sanitize_message(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for c in input.chars().filter(|c| u32::from(*c) >= 32) {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }

    out.trim().to_string()
}
