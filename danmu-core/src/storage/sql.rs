//! SQL persistence tier (Postgres via sqlx).

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::debug;

use crate::Result;

#[derive(Clone)]
pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    /// Connect and make sure the two tables exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS env_configs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS cache_data (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn get_cache(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM cache_data WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set_cache(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO cache_data (name, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE SET value = $2, updated_at = NOW()
            ",
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        debug!(name, "Persisted cache key to SQL");
        Ok(())
    }

    pub async fn load_env_configs(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM env_configs")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("key"), r.get::<String, _>("value")))
            .collect())
    }

    pub async fn upsert_env_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO env_configs (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = $2
            ",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
