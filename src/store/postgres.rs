//! `PostgreSQL` city store.
//!
//! # Table: `cities`
//!
//! - `id` - serial primary key, read back as `BIGINT`
//! - `name` - unique, at most 100 characters
//! - `lat`, `lon` - degrees
//!
//! `ensure_schema` creates the table if missing and adds the unique name
//! index to tables created without one. Older tables with an `INT4` id are
//! read through an `id::BIGINT` cast.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::{City, CityId, CityStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cities (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        lat DOUBLE PRECISION NOT NULL,
        lon DOUBLE PRECISION NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS cities_name_key ON cities (name)",
];

const INSERT_CITY: &str = r#"
    INSERT INTO cities (name, lat, lon)
    VALUES ($1, $2, $3)
    ON CONFLICT (name) DO NOTHING
    RETURNING id::BIGINT AS id, name, lat, lon
"#;

const SELECT_BY_NAME: &str =
    "SELECT id::BIGINT AS id, name, lat, lon FROM cities WHERE name = $1";

const SELECT_BY_ID: &str = "SELECT id::BIGINT AS id, name, lat, lon FROM cities WHERE id = $1";

const SELECT_ALL: &str = "SELECT id::BIGINT AS id, name, lat, lon FROM cities ORDER BY id";

const DELETE_BY_ID: &str = "DELETE FROM cities WHERE id = $1";

/// A `CityStore` backed by a pooled `PostgreSQL` connection.
#[derive(Debug, Clone)]
pub struct PgCityStore {
    pool: PgPool,
}

impl PgCityStore {
    /// Open a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the database is unreachable.
    pub async fn connect(options: PgConnectOptions) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create the `cities` table and its unique name index if missing.
    ///
    /// Fails if an existing table already holds duplicate names.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("cities table checked/created");
        Ok(())
    }
}

#[async_trait]
impl CityStore for PgCityStore {
    async fn insert(&self, name: &str, lat: f64, lon: f64) -> Result<City, StoreError> {
        // No row back means the unique name index fired.
        let row = sqlx::query_as::<_, City>(INSERT_CITY)
            .bind(name)
            .bind(lat)
            .bind(lon)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::Conflict(name.to_string()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<City>, StoreError> {
        let city = sqlx::query_as::<_, City>(SELECT_BY_NAME)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(city)
    }

    async fn find_by_id(&self, id: CityId) -> Result<Option<City>, StoreError> {
        let city = sqlx::query_as::<_, City>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(city)
    }

    async fn list_all(&self) -> Result<Vec<City>, StoreError> {
        let cities = sqlx::query_as::<_, City>(SELECT_ALL)
            .fetch_all(&self.pool)
            .await?;
        Ok(cities)
    }

    async fn delete(&self, id: CityId) -> Result<(), StoreError> {
        sqlx::query(DELETE_BY_ID).bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
