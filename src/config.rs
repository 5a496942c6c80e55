use anyhow::{bail, Context};
use serde::Deserialize;

/// Token signing settings. Built once at startup and never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub upload_dir: String,
    /// Re-read the token subject from the store on every authenticated request.
    pub verify_user_on_request: bool,
}

/// Upper bound on `JWT_TTL_MINUTES`: one year.
pub const MAX_TTL_MINUTES: i64 = 365 * 24 * 60;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `var`, which maps a variable name to its value.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let store = match var("STORE_BACKEND")
            .unwrap_or_else(|| "postgres".into())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("unknown STORE_BACKEND {other:?}, expected postgres or memory"),
        };

        let database_url = var("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let jwt = JwtConfig {
            secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            ttl_minutes: parse_or(&var, "JWT_TTL_MINUTES", 30)?,
        };

        let config = Self {
            store,
            database_url,
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 10)?,
            jwt,
            upload_dir: var("UPLOAD_DIR").unwrap_or_else(|| "uploads".into()),
            verify_user_on_request: parse_or(&var, "AUTH_VERIFY_USER", false)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt.secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if !(1..=MAX_TTL_MINUTES).contains(&self.jwt.ttl_minutes) {
            bail!("JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}");
        }
        Ok(())
    }
}

/// Unset falls back to `default`; a value that does not parse is an error.
fn parse_or<T>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(e) => bail!("invalid {key} {raw:?}: {e}"),
        },
    }
}
