use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("must contain lowercase, uppercase, and digit characters")]
    MissingCharacterClasses,
    #[error("invalid format")]
    InvalidFormat,
}

pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len < 2 {
        return Err(ValidationError::TooShort { min: 2, got: len });
    }
    if len > 50 {
        return Err(ValidationError::TooLong { max: 50, got: len });
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() > 255 {
        return Err(ValidationError::TooLong { max: 255, got: email.len() });
    }
    let parts: Vec<&str> = email.splitn(2, '@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ValidationError::InvalidFormat);
    }
    if !parts[1].contains('.') {
        return Err(ValidationError::InvalidFormat);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.len();
    if len < 6 {
        return Err(ValidationError::TooShort { min: 6, got: len });
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Err(ValidationError::MissingCharacterClasses);
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<(), ValidationError> {
    let len = bio.chars().count();
    if len > 200 {
        return Err(ValidationError::TooLong { max: 200, got: len });
    }
    Ok(())
}

pub fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    // Whitespace-only text is as empty as the empty string.
    let len = text.trim().chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 1000 {
        return Err(ValidationError::TooLong { max: 1000, got: len });
    }
    Ok(())
}

pub fn validate_chat_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 100 {
        return Err(ValidationError::TooLong { max: 100, got: len });
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> Result<(), ValidationError> {
    let len = emoji.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 10 {
        return Err(ValidationError::TooLong { max: 10, got: len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_bounds() {
        assert!(validate_display_name("ab").is_ok());
        assert!(validate_display_name("a").is_err());
        assert!(validate_display_name(&"x".repeat(50)).is_ok());
        assert!(validate_display_name(&"x".repeat(51)).is_err());
    }

    #[test]
    fn display_name_trims_before_counting() {
        assert!(validate_display_name("  a  ").is_err());
    }

    #[test]
    fn password_requires_all_classes() {
        assert!(validate_password("Abc123").is_ok());
        assert!(validate_password("abc123").is_err());
        assert!(validate_password("ABC123").is_err());
        assert!(validate_password("Abcdef").is_err());
        assert!(validate_password("Ab1").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn message_text_bounds() {
        assert!(validate_message_text("hi").is_ok());
        assert!(validate_message_text("").is_err());
        assert!(validate_message_text(&"x".repeat(1000)).is_ok());
        assert!(validate_message_text(&"x".repeat(1001)).is_err());
    }

    #[test]
    fn message_text_rejects_whitespace_only() {
        assert!(validate_message_text("   ").is_err());
        assert!(validate_message_text("\t\n").is_err());
        assert!(validate_message_text("  hi  ").is_ok());
    }

    #[test]
    fn emoji_counts_chars_not_bytes() {
        assert!(validate_emoji("👍").is_ok());
        assert!(validate_emoji("").is_err());
        assert!(validate_emoji(&"👍".repeat(11)).is_err());
    }
}
