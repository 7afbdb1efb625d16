use std::path::PathBuf;

use anyhow::Context;

/// Fallback signing secret used when `POSTBOX_JWT_SECRET` is unset.
/// Anything deployed must override it.
pub const FALLBACK_JWT_SECRET: &str = "your-secret-key";

/// Process configuration, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("POSTBOX_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("POSTBOX_PORT is not a valid port: {raw:?}"))?,
            None => 5000,
        };

        Ok(Self {
            db_path: lookup("POSTBOX_DB_PATH")
                .unwrap_or_else(|| "postbox.db".into())
                .into(),
            jwt_secret: lookup("POSTBOX_JWT_SECRET")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| FALLBACK_JWT_SECRET.into()),
            host: lookup("POSTBOX_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
        })
    }

    pub fn uses_fallback_secret(&self) -> bool {
        self.jwt_secret == FALLBACK_JWT_SECRET
    }
}
