//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const CLERK_API_BASE: &str = "https://api.clerk.com/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the Cloudinary asset store.
#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub upload_dir: PathBuf,

    // --- Identity ---
    pub clerk_secret_key: String,
    pub clerk_api_url: String,

    // --- Providers ---
    pub gemini_api_key: String,
    pub text_api_base: String,
    pub text_model: String,
    pub clipdrop_api_key: String,
    pub cloudinary: CloudinaryConfig,
    pub provider_timeout: Duration,

    // --- Quota and limits ---
    pub free_usage_limit: u32,
    pub max_resume_bytes: u64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address = parsed_or("BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let database_url = required("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("creation-uploads"));

        // --- Load Identity Provider Settings ---
        let clerk_secret_key = required("CLERK_SECRET_KEY")?;
        let clerk_api_url =
            std::env::var("CLERK_API_URL").unwrap_or_else(|_| CLERK_API_BASE.to_string());

        // --- Load Provider Keys and Settings ---
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let text_api_base =
            std::env::var("TEXT_API_BASE").unwrap_or_else(|_| GEMINI_OPENAI_BASE.to_string());
        let text_model =
            std::env::var("TEXT_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());
        let clipdrop_api_key = required("CLIPDROP_API_KEY")?;
        let cloudinary = CloudinaryConfig {
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: required("CLOUDINARY_API_SECRET")?,
        };
        let provider_timeout = Duration::from_secs(parsed_or("PROVIDER_TIMEOUT_SECS", 60u64)?);

        // --- Load Quota Settings ---
        let free_usage_limit = parsed_or("FREE_USAGE_LIMIT", 10u32)?;
        let max_resume_bytes = parsed_or("MAX_RESUME_BYTES", 5 * 1024 * 1024u64)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            upload_dir,
            clerk_secret_key,
            clerk_api_url,
            gemini_api_key,
            text_api_base,
            text_model,
            clipdrop_api_key,
            cloudinary,
            provider_timeout,
            free_usage_limit,
            max_resume_bytes,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

/// Parses `name` when set, otherwise falls back to `default`.
fn parsed_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_falls_back_and_reports_bad_values() {
        assert_eq!(
            parsed_or("CREATION_TEST_UNSET_LIMIT", 10u32).unwrap(),
            10
        );

        std::env::set_var("CREATION_TEST_BAD_LIMIT", "ten");
        let err = parsed_or("CREATION_TEST_BAD_LIMIT", 10u32).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "CREATION_TEST_BAD_LIMIT"));
        std::env::remove_var("CREATION_TEST_BAD_LIMIT");
    }

    #[test]
    fn missing_required_var_is_named() {
        let err = required("CREATION_TEST_DEFINITELY_MISSING").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing the environment variable CREATION_TEST_DEFINITELY_MISSING"
        );
    }
}
