//! Gateway configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). The HTTP port is always mandatory; the PostgreSQL
//! settings are mandatory only while persistence is enabled. Session
//! tuning knobs fall back to defaults.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;

const HTTP_PORT: &str = "HTTP_PORT";
const PERSISTENCE_ENABLED: &str = "PERSISTENCE_ENABLED";
const POSTGRES_HOST: &str = "POSTGRES_HOST";
const POSTGRES_USER: &str = "POSTGRES_USER";
const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
const POSTGRES_DB: &str = "POSTGRES_DB";
const POSTGRES_PORT: &str = "POSTGRES_PORT";
const POSTGRES_SUBSCRIPTIONS_TABLE_SCHEMA: &str = "POSTGRES_SUBSCRIPTIONS_TABLE_SCHEMA";
const POSTGRES_SUBSCRIPTIONS_TABLE_NAME: &str = "POSTGRES_SUBSCRIPTIONS_TABLE_NAME";

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// PostgreSQL settings, `None` when persistence is disabled and the
    /// in-memory store is used instead.
    pub postgres: Option<PostgresConfig>,

    /// Per-connection session tuning.
    pub session: SessionConfig,
}

/// PostgreSQL connection and table settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Subscriptions table location.
    pub subscriptions_table: TableConfig,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Timeout for acquiring a connection.
    pub connect_timeout: Duration,
}

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Schema holding the table.
    pub schema: String,
    /// Table name.
    pub name: String,
}

/// Timing and sizing for every WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Interval between keepalive pings.
    pub ping_period: Duration,
    /// Deadline for sending the close frame on teardown.
    pub close_timeout: Duration,
    /// Deadline for a single outbound write.
    pub write_timeout: Duration,
    /// Capacity of the outbound message queue.
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_period: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            outbound_capacity: 256,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a mandatory variable is missing or a
    /// port cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] for the first missing mandatory
    /// variable and [`ConfigError::InvalidVar`] for an unparseable port.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let http_port: u16 = parse_required(&lookup, HTTP_PORT)?;
        let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, http_port));

        let postgres = if parse_bool(&lookup, PERSISTENCE_ENABLED, true) {
            Some(PostgresConfig::from_lookup(&lookup)?)
        } else {
            None
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            ping_period: parse_secs(&lookup, "WS_PING_PERIOD_SECS", defaults.ping_period),
            close_timeout: parse_secs(&lookup, "WS_CLOSE_TIMEOUT_SECS", defaults.close_timeout),
            write_timeout: parse_secs(&lookup, "WS_WRITE_TIMEOUT_SECS", defaults.write_timeout),
            outbound_capacity: parse_or(&lookup, "WS_OUTBOUND_CAPACITY", defaults.outbound_capacity)
                .max(1),
        };

        Ok(Self {
            listen_addr,
            postgres,
            session,
        })
    }
}

impl PostgresConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required(lookup, POSTGRES_HOST)?;
        let user = required(lookup, POSTGRES_USER)?;
        let password = required(lookup, POSTGRES_PASSWORD)?;
        let database = required(lookup, POSTGRES_DB)?;
        let port = parse_required(lookup, POSTGRES_PORT)?;
        let subscriptions_table = TableConfig {
            schema: required(lookup, POSTGRES_SUBSCRIPTIONS_TABLE_SCHEMA)?,
            name: required(lookup, POSTGRES_SUBSCRIPTIONS_TABLE_NAME)?,
        };

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            subscriptions_table,
            max_connections: parse_or(lookup, "DATABASE_MAX_CONNECTIONS", 10),
            connect_timeout: parse_secs(lookup, "DATABASE_CONNECT_TIMEOUT_SECS", Duration::from_secs(5)),
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or(ConfigError::MissingVar(key))
}

fn parse_required<F, T>(lookup: &F, key: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let value = required(lookup, key)?;
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidVar { name: key, value })
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .filter(|secs: &u64| *secs > 0)
        .map_or(default, Duration::from_secs)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
