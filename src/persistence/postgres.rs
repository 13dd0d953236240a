//! PostgreSQL implementation of the subscription store.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use super::SubscriptionStore;
use super::models::{SUBSCRIPTION_COLUMNS, SubscriptionRow, into_subscription};
use crate::config::{PostgresConfig, TableConfig};
use crate::domain::{ExtraNonce1, NewSubscription, Subscription};
use crate::error::GatewayError;

/// PostgreSQL-backed subscription store using `sqlx::PgPool`.
///
/// The table location is injected from configuration; statements are
/// rendered once at construction.
#[derive(Debug, Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
    table: String,
}

impl PostgresSubscriptionStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool, table: &TableConfig) -> Self {
        Self {
            pool,
            table: qualified_table(table),
        }
    }

    /// Opens a connection pool from configuration and wraps it.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] if the database cannot
    /// be reached.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, GatewayError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "connected to postgres"
        );
        Ok(Self::new(pool, &config.subscriptions_table))
    }

    /// Creates the schema and subscriptions table if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn ensure_schema(&self, table: &TableConfig) -> Result<(), GatewayError> {
        sqlx::query(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(&table.schema)
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} ( \
             extra_nonce_1 BIGSERIAL PRIMARY KEY, \
             extra_nonce_2 BIGINT NOT NULL, \
             set_difficulty TEXT NOT NULL, \
             notify TEXT NOT NULL, \
             subscriber TEXT NOT NULL, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
             active_session BOOLEAN NOT NULL DEFAULT TRUE)",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        tracing::debug!(table = %self.table, "subscriptions table ready");
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn fetch(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM {} \
             WHERE extra_nonce_1 = $1 AND subscriber = $2",
            self.table
        ))
        .bind(extra_nonce1.get())
        .bind(subscriber)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_subscription))
    }

    async fn create(&self, new: NewSubscription) -> Result<Subscription, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "INSERT INTO {} (extra_nonce_2, set_difficulty, notify, subscriber) \
             VALUES ($1, $2, $3, $4) RETURNING {SUBSCRIPTION_COLUMNS}",
            self.table
        ))
        .bind(new.extra_nonce2)
        .bind(new.set_difficulty)
        .bind(new.notify)
        .bind(new.subscriber)
        .fetch_one(&self.pool)
        .await?;

        Ok(into_subscription(row))
    }

    async fn set_active_session(
        &self,
        extra_nonce1: ExtraNonce1,
        active: bool,
    ) -> Result<bool, GatewayError> {
        sqlx::query_scalar::<_, bool>(&format!(
            "UPDATE {} SET active_session = $1 WHERE extra_nonce_1 = $2 RETURNING active_session",
            self.table
        ))
        .bind(active)
        .bind(extra_nonce1.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => GatewayError::SubscriptionNotFound(extra_nonce1),
            other => GatewayError::from(other),
        })
    }

    async fn claim(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE {} SET active_session = TRUE \
             WHERE extra_nonce_1 = $1 AND subscriber = $2 AND active_session = FALSE \
             RETURNING {SUBSCRIPTION_COLUMNS}",
            self.table
        ))
        .bind(extra_nonce1.get())
        .bind(subscriber)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_subscription))
    }
}

fn qualified_table(table: &TableConfig) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

/// Quotes an SQL identifier, doubling embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
