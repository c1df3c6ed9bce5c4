use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::error;

use tandem_delivery::DeliveryConfig;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "dev-secret-change-me",
    "change-me",
    "changeme",
    "secret",
    "your-secret-here",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub push_timeout: Duration,
    pub store_timeout: Duration,
    pub history_page_size: u32,
    pub max_history_page: u32,
    pub outbound_buffer: usize,
}

impl Config {
    /// Read `TANDEM_*` variables from the process environment. The binary
    /// loads `.env` before calling this.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from `lookup`. Failures are logged before returning.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Self::parse(lookup).inspect_err(|e| error!("Invalid configuration: {:#}", e))
    }

    fn parse(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("TANDEM_JWT_SECRET").context("TANDEM_JWT_SECRET must be set")?;
        let trimmed = jwt_secret.trim();
        if trimmed.is_empty() || PLACEHOLDER_SECRETS.contains(&trimmed) {
            bail!("TANDEM_JWT_SECRET is empty or a placeholder; set a real secret");
        }

        Ok(Self {
            host: lookup("TANDEM_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "TANDEM_PORT", 8082)?,
            db_path: PathBuf::from(lookup("TANDEM_DB_PATH").unwrap_or_else(|| "tandem.db".into())),
            jwt_secret,
            push_timeout: Duration::from_millis(parse_or(&lookup, "TANDEM_PUSH_TIMEOUT_MS", 2_000)?),
            store_timeout: Duration::from_millis(parse_or(&lookup, "TANDEM_STORE_TIMEOUT_MS", 5_000)?),
            history_page_size: parse_or(&lookup, "TANDEM_HISTORY_PAGE_SIZE", 50)?,
            max_history_page: parse_or(&lookup, "TANDEM_HISTORY_MAX_PAGE", 200)?,
            outbound_buffer: parse_or(&lookup, "TANDEM_OUTBOUND_BUFFER", 64)?,
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            push_timeout: self.push_timeout,
            store_timeout: self.store_timeout,
            history_page_size: self.history_page_size,
            max_history_page: self.max_history_page,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
