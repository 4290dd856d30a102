//! City persistence.
//!
//! `CityStore` is the seam; `InMemoryCityStore` and `PgCityStore` implement it.
//! Names are unique in every store so concurrent creates of the same name
//! cannot produce duplicate rows.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryCityStore;
pub use postgres::PgCityStore;

/// Registry-assigned city identifier. Never reused after deletion.
pub type CityId = i64;

/// A registered city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct City {
    pub id: CityId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Another row already holds this name.
    #[error("City '{0}' already exists")]
    Conflict(String),
}

#[async_trait]
pub trait CityStore: Send + Sync {
    /// Insert a new city and return it with its fresh id.
    ///
    /// Fails with `StoreError::Conflict` if the name is taken.
    async fn insert(&self, name: &str, lat: f64, lon: f64) -> Result<City, StoreError>;

    /// Exact, case-sensitive name match.
    async fn find_by_name(&self, name: &str) -> Result<Option<City>, StoreError>;

    async fn find_by_id(&self, id: CityId) -> Result<Option<City>, StoreError>;

    /// All cities, ordered by id.
    async fn list_all(&self) -> Result<Vec<City>, StoreError>;

    /// Remove a city. Unknown ids are a no-op.
    async fn delete(&self, id: CityId) -> Result<(), StoreError>;
}
