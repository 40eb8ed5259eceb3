//! Phone number normalisation for contacts.
//!
//! Numbers are stored in international `+<country><subscriber>` form so the
//! gateway receives the same representation regardless of how they were typed.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhoneNumberError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number contains invalid characters: {0}")]
    InvalidCharacters(String),
    #[error("national number {0} requires a default country code")]
    MissingCountryCode(String),
    #[error("phone number {0} is not a valid international number")]
    Invalid(String),
}

fn international_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("international phone pattern compiles")
    })
}

/// Normalise `raw` into international form.
///
/// Separators (space, `-`, `.`, `(`, `)`) are stripped, a leading `00` becomes
/// `+`, and national numbers get `default_country_code` prepended after
/// dropping a single trunk `0`.
pub fn normalize_phone_number(
    raw: &str,
    default_country_code: Option<&str>,
) -> Result<String, PhoneNumberError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PhoneNumberError::Empty);
    }

    let compact: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let (has_plus, digits) = match compact.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, compact.as_str()),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhoneNumberError::InvalidCharacters(raw.to_string()));
    }

    let normalized = if has_plus {
        format!("+{digits}")
    } else if let Some(rest) = digits.strip_prefix("00") {
        format!("+{rest}")
    } else {
        let country = default_country_code
            .map(|code| code.trim().trim_start_matches('+'))
            .filter(|code| !code.is_empty())
            .ok_or_else(|| PhoneNumberError::MissingCountryCode(raw.to_string()))?;
        let national = digits.strip_prefix('0').unwrap_or(digits);
        format!("+{country}{national}")
    };

    if international_pattern().is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(PhoneNumberError::Invalid(raw.to_string()))
    }
}
