use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub notify_on_message: bool,
}

impl ServerConfig {
    /// Read `WANDER_*` environment variables, falling back to development defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("WANDER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = match lookup("WANDER_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("WANDER_PORT is not a valid port: {}", raw))?,
            None => 3000,
        };
        let db_path: PathBuf = lookup("WANDER_DB_PATH")
            .unwrap_or_else(|| "wander.db".into())
            .into();
        let jwt_secret = lookup("WANDER_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEV_SECRET.into());
        let notify_on_message = match lookup("WANDER_NOTIFY_ON_MESSAGE") {
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("WANDER_NOTIFY_ON_MESSAGE is not a boolean: {}", raw))?,
            None => true,
        };

        if jwt_secret == DEV_SECRET {
            warn!("WANDER_JWT_SECRET is unset; using the development placeholder");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            notify_on_message,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
