//! Configuration loading from environment.
//!
//! Reads the Discord token and local service settings from environment
//! variables, with sensible defaults for everything non-secret.

use std::env;

use crate::error::{Result, WardenError};

/// Default path for the SQLite configuration store.
pub const DEFAULT_DATABASE_PATH: &str = "warden.db";

/// Default port for the health check endpoint.
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Main configuration for the Warden bot.
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Discord bot token.
    pub discord_token: String,
    /// Path to the SQLite database file.
    pub database_path: String,
    /// Port for the health check HTTP server.
    pub health_port: u16,
}

impl WardenConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DISCORD_TOKEN`: Discord bot token
    ///
    /// Optional:
    /// - `DATABASE_PATH`: SQLite file path (default: `warden.db`)
    /// - `HEALTH_PORT`: health endpoint port (default: 8080)
    pub fn from_env() -> Result<Self> {
        let discord_token = env::var("DISCORD_TOKEN")
            .map_err(|_| WardenError::Config("DISCORD_TOKEN not set".to_string()))?;

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());

        let health_port = parse_port(env::var("HEALTH_PORT").ok(), DEFAULT_HEALTH_PORT);

        Ok(Self {
            discord_token,
            database_path,
            health_port,
        })
    }
}

/// Parse a port number from an optional string, falling back to a default.
fn parse_port(value: Option<String>, default: u16) -> u16 {
    value.and_then(|s| s.parse().ok()).unwrap_or(default)
}
