//! Custom validators used by request schemas
//!
//! Each function plugs into `#[validate(custom(function = "..."))]`.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use validator::ValidationError;

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Validate password strength
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < 8 {
        return Err(invalid(
            "password_length",
            "Password must be at least 8 characters long",
        ));
    }

    if password.len() > 128 {
        return Err(invalid(
            "password_length",
            "Password must be at most 128 characters long",
        ));
    }

    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_digit = false;

    for c in password.chars() {
        if c.is_ascii_uppercase() {
            has_upper = true;
        } else if c.is_ascii_lowercase() {
            has_lower = true;
        } else if c.is_ascii_digit() {
            has_digit = true;
        }
    }

    if !has_upper {
        return Err(invalid(
            "password_uppercase",
            "Password must contain at least one uppercase letter",
        ));
    }

    if !has_lower {
        return Err(invalid(
            "password_lowercase",
            "Password must contain at least one lowercase letter",
        ));
    }

    if !has_digit {
        return Err(invalid(
            "password_digit",
            "Password must contain at least one digit",
        ));
    }

    Ok(())
}

/// Reject values that are empty once trimmed
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid("blank", "Value must not be blank"));
    }
    Ok(())
}

/// `#rgb` or `#rrggbb`
pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    static COLOR_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = COLOR_REGEX.get_or_init(|| {
        Regex::new(r"^#(?:[0-9a-fA-F]{3}){1,2}$").expect("Failed to compile color regex")
    });

    if !regex.is_match(color) {
        return Err(invalid("color", "Color must be a hex value like #1a2b3c"));
    }
    Ok(())
}

/// Lowercase words separated by single hyphens
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    static SLUG_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = SLUG_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("Failed to compile slug regex")
    });

    if !regex.is_match(slug) {
        return Err(invalid(
            "slug",
            "Slug may only contain lowercase letters, digits and single hyphens",
        ));
    }
    Ok(())
}

/// Build a URL slug from a display name.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single hyphen and strips hyphens at both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_rules() {
        assert!(validate_password_strength("Passw0rd").is_ok());
        assert!(validate_password_strength("Sh0rt").is_err());
        assert!(validate_password_strength("alllower1").is_err());
        assert!(validate_password_strength("ALLUPPER1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
        assert!(validate_password_strength(&"Aa1".repeat(50)).is_err());
    }

    #[test]
    fn test_password_error_message() {
        let error = validate_password_strength("short").unwrap_err();
        assert_eq!(
            error.message.as_deref(),
            Some("Password must be at least 8 characters long")
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
        assert_eq!(slugify("  --Hello,   World!!  "), "hello-world");
        assert_eq!(slugify("Ben & Jerry's"), "ben-jerry-s");
        assert_eq!(slugify("ÉCOLE 42"), "cole-42");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slug_and_color() {
        assert!(validate_slug("acme-corp").is_ok());
        assert!(validate_slug("acme--corp").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_hex_color("#fff").is_ok());
        assert!(validate_hex_color("#A1B2C3").is_ok());
        assert!(validate_hex_color("red").is_err());
    }

    #[test]
    fn test_not_blank() {
        assert!(validate_not_blank(" x ").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }
}
