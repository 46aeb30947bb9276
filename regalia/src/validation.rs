//! Validation rules for nicknames, prefixes, suffixes and colors
//!
//! All checks are pure. The boolean form answers "is this acceptable"; the
//! `check_*` form names the rule that failed so the caller can report it.

use crate::color::{strip_colors, ColorSpec};
use crate::error::ValidationFailure;

/// Fixed denylist, matched as case-insensitive substrings.
///
/// Substring matching over-blocks ("class" contains "ass") and does nothing
/// about spacing or leetspeak; that weakness is kept as-is.
const PROFANITY: &[&str] = &[
    "damn", "shit", "fuck", "bitch", "ass", "crap", "bastard", "dick", "piss", "cunt", "slut",
    "whore",
];

/// Removed by [`sanitize`]
const MARKUP_INJECTION: &[char] = &['<', '>', '"', '\'', '&'];

type Check = std::result::Result<(), ValidationFailure>;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-')
}

/// Prefixes and suffixes may also carry decorative brackets and symbols
fn is_tag_char(c: char) -> bool {
    is_name_char(c)
        || matches!(
            c,
            '[' | ']' | '(' | ')' | '{' | '}' | '|' | '!' | '?' | '*' | '+' | ':' | '#' | '~'
        )
}

fn check_length(text: &str, min: usize, max: usize) -> Check {
    let actual = text.chars().count();
    if actual == 0 && min > 0 {
        return Err(ValidationFailure::Empty);
    }
    if actual < min {
        return Err(ValidationFailure::TooShort { min, actual });
    }
    if actual > max {
        return Err(ValidationFailure::TooLong { max, actual });
    }
    Ok(())
}

fn check_charset(text: &str, allowed: fn(char) -> bool) -> Check {
    match text.chars().find(|c| !allowed(*c)) {
        Some(c) => Err(ValidationFailure::InvalidCharacter(c)),
        None => Ok(()),
    }
}

pub fn check_nickname(raw: &str, min_len: usize, max_len: usize) -> Check {
    let stripped = strip_colors(raw);
    check_length(&stripped, min_len, max_len)?;
    check_charset(&stripped, is_name_char)
}

/// Length in `[min_len, max_len]` and only `[A-Za-z0-9 ._-]` after stripping colors
pub fn validate_nickname(raw: &str, min_len: usize, max_len: usize) -> bool {
    check_nickname(raw, min_len, max_len).is_ok()
}

pub fn check_prefix_or_suffix(
    raw: &str,
    min_len: usize,
    max_len: usize,
    forbidden_words: &[String],
) -> Check {
    let stripped = strip_colors(raw).to_lowercase();
    check_length(&stripped, min_len, max_len)?;
    check_charset(&stripped, is_tag_char)?;

    for word in forbidden_words {
        let word = word.trim().to_lowercase();
        if !word.is_empty() && stripped.contains(&word) {
            return Err(ValidationFailure::ForbiddenWord(word));
        }
    }

    if let Some(word) = find_profanity(&stripped) {
        return Err(ValidationFailure::Profanity(word.to_string()));
    }

    Ok(())
}

/// Length, character-set, forbidden-word and profanity rules for tags
pub fn validate_prefix_or_suffix(
    raw: &str,
    min_len: usize,
    max_len: usize,
    forbidden_words: &[String],
) -> bool {
    check_prefix_or_suffix(raw, min_len, max_len, forbidden_words).is_ok()
}

pub fn check_color_spec(spec: &str) -> Check {
    ColorSpec::parse(spec)
        .map(|_| ())
        .map_err(|_| ValidationFailure::InvalidColor(spec.trim().to_string()))
}

/// Accepts anything `parse_color` accepts, `start:end` gradients and `rainbow`
pub fn validate_color_spec(spec: &str) -> bool {
    check_color_spec(spec).is_ok()
}

/// First denylisted word found in `text`, if any
pub fn find_profanity(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    PROFANITY.iter().copied().find(|word| lower.contains(word))
}

fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Identity-handle rule with configurable length bounds
pub fn check_identity_handle(text: &str, min_len: usize, max_len: usize) -> Check {
    check_length(text, min_len, max_len)?;
    check_charset(text, is_handle_char)
}

/// True for a stable identity handle: `[A-Za-z0-9_]`, 3 to 16 characters
pub fn is_identity_handle(text: &str) -> bool {
    check_identity_handle(text, 3, 16).is_ok()
}

/// Drop markup-injection characters and surrounding whitespace
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !MARKUP_INJECTION.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_length_bounds() {
        assert!(!validate_nickname("ab", 3, 16));
        assert!(validate_nickname("Steve_01", 3, 16));
        assert!(!validate_nickname("ThisNameIsWayTooLong", 3, 16));
        assert_eq!(
            check_nickname("ab", 3, 16),
            Err(ValidationFailure::TooShort { min: 3, actual: 2 })
        );
        assert_eq!(check_nickname("", 3, 16), Err(ValidationFailure::Empty));
    }

    #[test]
    fn test_nickname_strips_colors_first() {
        assert!(validate_nickname("&cNova", 3, 16));
        assert!(validate_nickname("<gold>Mr. Nova</gold>", 3, 16));
        assert!(!validate_nickname("&c&l", 3, 16));
        assert_eq!(
            check_nickname("Nova!", 3, 16),
            Err(ValidationFailure::InvalidCharacter('!'))
        );
    }

    #[test]
    fn test_prefix_rules() {
        assert!(validate_prefix_or_suffix("[VIP]", 1, 16, &[]));
        assert!(validate_prefix_or_suffix("&a[VIP]", 1, 16, &[]));
        assert!(!validate_prefix_or_suffix("[damn]", 1, 16, &[]));
        assert_eq!(
            check_prefix_or_suffix("[DaMn]", 1, 16, &[]),
            Err(ValidationFailure::Profanity("damn".into()))
        );
        assert_eq!(
            check_prefix_or_suffix("[Admin]", 1, 16, &["admin".to_string()]),
            Err(ValidationFailure::ForbiddenWord("admin".into()))
        );
        assert_eq!(
            check_prefix_or_suffix("[VIP]@", 1, 16, &[]),
            Err(ValidationFailure::InvalidCharacter('@'))
        );
    }

    #[test]
    fn test_profanity_over_blocks_substrings() {
        assert!(!validate_prefix_or_suffix("[Class]", 1, 16, &[]));
        assert_eq!(find_profanity("Glass"), Some("ass"));
        assert_eq!(find_profanity("d a m n"), None);
    }

    #[test]
    fn test_color_specs() {
        assert!(validate_color_spec(""));
        assert!(validate_color_spec("red"));
        assert!(validate_color_spec("#00FFaa"));
        assert!(validate_color_spec("red:gold"));
        assert!(validate_color_spec("rainbow"));
        assert!(!validate_color_spec("red:"));
        assert!(!validate_color_spec("#00FFa"));
        assert_eq!(
            check_color_spec("octarine"),
            Err(ValidationFailure::InvalidColor("octarine".into()))
        );
    }

    #[test]
    fn test_identity_handle() {
        assert!(is_identity_handle("Steve_01"));
        assert!(!is_identity_handle("Mr. Nova"));
        assert!(!is_identity_handle("ab"));
        assert_eq!(
            check_identity_handle("Mr. Nova", 3, 16),
            Err(ValidationFailure::InvalidCharacter('.'))
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  <b>Nova's & \"co\"</b> "), "bNovas  co/b");
        assert_eq!(sanitize("§a[VIP]"), "§a[VIP]");
    }
}
