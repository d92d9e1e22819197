//! Error types for the Warden bot.
//!
//! All errors are explicitly typed using thiserror. No panics in production code.

use thiserror::Error;

/// Central error type for all Warden operations.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Discord API error from serenity.
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<serenity::Error>),

    /// Configuration error (missing env vars, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Regex pattern compilation error.
    #[error("Regex pattern error: {0}")]
    RegexPattern(#[from] regex::Error),
}

impl WardenError {
    /// Get user-friendly error message (hides internal details).
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DiscordApi(_) => "Discord service temporarily unavailable",
            Self::Config(_) => "Service configuration error",
            Self::Database(_) => "Database service temporarily unavailable",
            Self::RegexPattern(_) => "Invalid pattern configuration",
        }
    }
}

/// Result type alias for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_config() {
        let err = WardenError::Config("DISCORD_TOKEN not set".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: DISCORD_TOKEN not set"
        );
    }

    #[test]
    fn error_display_database() {
        let err = WardenError::Database("connection refused".to_string());
        assert_eq!(err.to_string(), "Database error: connection refused");
    }

    #[test]
    fn error_user_message_hides_details() {
        let err = WardenError::Database("SELECT * FROM log_channels".to_string());
        assert_eq!(
            err.user_message(),
            "Database service temporarily unavailable"
        );
        assert!(!err.user_message().contains("log_channels"));
    }
}
