use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_TTL_MINUTES: i64 = 30;
/// One year.
pub const MAX_TTL_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let secret = std::env::var("SECRET_KEY").context("SECRET_KEY is not set")?;
        anyhow::ensure!(!secret.is_empty(), "SECRET_KEY must not be empty");

        let ttl_minutes =
            parse_ttl_minutes(std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES").ok().as_deref())?;

        let port = match std::env::var("APP_PORT") {
            Ok(v) => v.parse::<u16>().context("APP_PORT must be a port number")?,
            Err(_) => 8080,
        };

        Ok(Self {
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "User Accounts".into()),
            database_url,
            jwt: JwtConfig {
                secret,
                ttl_minutes,
            },
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
        })
    }

    /// `memory:` URLs select the in-process store instead of Postgres.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }
}

fn parse_ttl_minutes(raw: Option<&str>) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_TTL_MINUTES);
    };
    let ttl = raw
        .trim()
        .parse::<i64>()
        .context("ACCESS_TOKEN_EXPIRE_MINUTES must be an integer")?;
    anyhow::ensure!(
        (1..=MAX_TTL_MINUTES).contains(&ttl),
        "ACCESS_TOKEN_EXPIRE_MINUTES must be between 1 and {MAX_TTL_MINUTES}"
    );
    Ok(ttl)
}
