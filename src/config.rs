use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Placeholder secrets that are only acceptable for local runs.
const PLACEHOLDER_SECRETS: &[&str] = &["secret", "changeme", "change-me", "dev-secret"];
const MIN_SECRET_LEN: usize = 32;
/// One year.
const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

impl Environment {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => bail!("unknown APP_ENV {other:?}, expected local, dev or prod"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_attempts: u32,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    pub enabled: bool,
    pub redis_url: String,
    pub stream: String,
    pub publish_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: Environment,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub jwt: JwtConfig,
    pub events: EventsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup and validates it.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let env = Environment::parse(&var("APP_ENV", "local"))?;

        let url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                var("POSTGRES_USER", "postgres"),
                var("POSTGRES_PASSWORD", "postgres"),
                var("POSTGRES_HOST", "localhost"),
                var("POSTGRES_PORT", "5432"),
                var("POSTGRES_DB", "postgres_db"),
            ),
        };
        let database = DatabaseConfig {
            url,
            max_attempts: parse_or(&lookup, "POSTGRES_MAX_ATTEMPTS", 5)?,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parse_bool_or(&lookup, "RUN_MIGRATIONS", true)?,
        };

        let http = HttpConfig {
            host: var("APP_HOST", "0.0.0.0"),
            port: parse_or(&lookup, "APP_PORT", 8082)?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "HTTP_REQUEST_TIMEOUT_SECS",
                10,
            )?),
            shutdown_timeout: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 10)?),
        };

        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: var("JWT_ISSUER", "taskmanager"),
            ttl_minutes: parse_or(&lookup, "JWT_TTL_MINUTES", 10)?,
        };

        let events = EventsConfig {
            enabled: parse_bool_or(&lookup, "EVENTS_ENABLED", false)?,
            redis_url: var("REDIS_URL", "redis://localhost:6379"),
            stream: var("EVENTS_STREAM", "log-topic"),
            publish_timeout: Duration::from_millis(parse_or(
                &lookup,
                "EVENTS_PUBLISH_TIMEOUT_MS",
                2000,
            )?),
        };

        let config = Self {
            env,
            database,
            http,
            jwt,
            events,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let secret = self.jwt.secret.trim();
        if secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if self.env != Environment::Local {
            if PLACEHOLDER_SECRETS.contains(&secret.to_ascii_lowercase().as_str()) {
                bail!("JWT_SECRET is a placeholder value, refusing to start in {:?}", self.env);
            }
            if secret.len() < MIN_SECRET_LEN {
                bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes outside local");
            }
        }
        if self.jwt.ttl_minutes <= 0 {
            bail!("JWT_TTL_MINUTES must be positive");
        }
        if self.jwt.ttl_minutes > MAX_TTL_MINUTES {
            bail!("JWT_TTL_MINUTES must not exceed {MAX_TTL_MINUTES} (one year)");
        }
        if self.database.max_attempts == 0 {
            bail!("POSTGRES_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> anyhow::Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => bail!("invalid boolean for {key}: {other:?}"),
    }
}
