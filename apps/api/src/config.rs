use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_APP_URL: &str = "http://localhost:8080";

/// Startup configuration failures. Any of these aborts the process before
/// the listener is bound.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// SMTP relay settings for the sign-in mailer.
///
/// `Debug` is implemented by hand so the password never reaches the logs.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub email: EmailConfig,
    /// Signs verification-token hashes. Rotating it invalidates outstanding links.
    pub auth_secret: SecretString,
    /// Public base URL used to build magic links and validate callback URLs.
    pub app_url: String,
    pub port: u16,
    pub rust_log: String,
    pub db_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("email", &self.email)
            .field("auth_secret", &"[REDACTED]")
            .field("app_url", &self.app_url)
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .field("db_timeout_secs", &self.db_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Every required key is
    /// checked before returning so the operator sees all gaps at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut require = |key: &'static str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };

        let database_url = require("DATABASE_URL");
        let smtp_host = require("EMAIL_SERVER_HOST");
        let smtp_port = require("EMAIL_SERVER_PORT");
        let smtp_username = require("EMAIL_SERVER_USER");
        let smtp_password = require("EMAIL_SERVER_PASSWORD");
        let from_address = require("EMAIL_FROM");
        let auth_secret = require("AUTH_SECRET");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let app_url = get("APP_URL")
            .unwrap_or_else(|| DEFAULT_APP_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&app_url).map_err(|e| ConfigError::Invalid {
            key: "APP_URL",
            reason: e.to_string(),
        })?;

        Ok(Config {
            database_url,
            email: EmailConfig {
                smtp_host,
                smtp_port: parse_num("EMAIL_SERVER_PORT", &smtp_port)?,
                smtp_username,
                smtp_password: SecretString::from(smtp_password),
                from_address,
                timeout_secs: optional_num(&get, "SMTP_TIMEOUT_SECS", 10)?,
            },
            auth_secret: SecretString::from(auth_secret),
            app_url,
            port: optional_num(&get, "PORT", 8080)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            db_timeout_secs: optional_num(&get, "DB_TIMEOUT_SECS", 5)?,
        })
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn uses_https(&self) -> bool {
        self.app_url.starts_with("https://")
    }
}

fn parse_num<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn optional_num<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => parse_num(key, &raw),
        None => Ok(default),
    }
}
