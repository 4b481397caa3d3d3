//! Field rules shared by the organization and region dialogs.

use std::sync::LazyLock;

use regex::Regex;

pub const IDENTIFIER_MIN_LEN: usize = 2;
pub const IDENTIFIER_MAX_LEN: usize = 64;

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9-]*[a-z0-9]$").expect("identifier pattern must compile")
});

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdentifierViolation {
    TooShort,
    TooLong,
    /// Not lowercase alphanumerics and inner hyphens.
    Pattern,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisplayNameViolation {
    Blank,
}

/// Machine-safe identifier such as an organization or region `name`.
pub fn check_identifier(value: &str) -> Result<(), IdentifierViolation> {
    let len = value.chars().count();
    if len < IDENTIFIER_MIN_LEN {
        return Err(IdentifierViolation::TooShort);
    }
    if len > IDENTIFIER_MAX_LEN {
        return Err(IdentifierViolation::TooLong);
    }
    if !IDENTIFIER_PATTERN.is_match(value) {
        return Err(IdentifierViolation::Pattern);
    }
    Ok(())
}

pub fn check_display_name(value: &str) -> Result<(), DisplayNameViolation> {
    if value.trim().is_empty() {
        return Err(DisplayNameViolation::Blank);
    }
    Ok(())
}

/// Derives an identifier from a display name: lowercased, characters outside
/// `[a-z0-9 _-]` dropped, separator runs folded into one hyphen, no hyphen at
/// either end.
pub fn derive_name(display_name: &str) -> String {
    let mut out = String::with_capacity(display_name.len());
    let mut pending_separator = false;
    for ch in display_name.chars().flat_map(char::to_lowercase) {
        match ch {
            'a'..='z' | '0'..='9' => {
                if pending_separator && !out.is_empty() {
                    out.push('-');
                }
                pending_separator = false;
                out.push(ch);
            }
            ' ' | '_' | '-' => pending_separator = true,
            _ => {}
        }
    }
    out
}
