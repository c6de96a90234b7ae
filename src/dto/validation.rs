//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest identity accepted from the identity provider.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Validates an opaque caller identity (host or team id).
///
/// # Examples
///
/// ```ignore
/// validate_identity("uid-42")   // Ok
/// validate_identity("   ")      // Err - blank
/// validate_identity("a\nb")     // Err - control character
/// ```
pub fn validate_identity(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        let mut err = ValidationError::new("identity_blank");
        err.message = Some("Identity must not be blank".into());
        return Err(err);
    }

    if id.len() > MAX_IDENTITY_LEN {
        let mut err = ValidationError::new("identity_length");
        err.message = Some(
            format!(
                "Identity must be at most {MAX_IDENTITY_LEN} bytes (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if id.chars().any(char::is_control) {
        let mut err = ValidationError::new("identity_format");
        err.message = Some("Identity must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Rejects strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identity_valid() {
        assert!(validate_identity("host-1").is_ok());
        assert!(validate_identity("a3f9c2d1-77aa").is_ok());
    }

    #[test]
    fn test_validate_identity_invalid() {
        assert!(validate_identity("").is_err());
        assert!(validate_identity("  ").is_err());
        assert!(validate_identity("tab\there").is_err());
        assert!(validate_identity(&"x".repeat(MAX_IDENTITY_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("hi").is_ok());
        assert!(validate_not_blank(" \n").is_err());
    }
}
