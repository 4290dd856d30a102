//! Process-local city store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{City, CityId, CityStore, StoreError};

#[derive(Debug, Default)]
struct Registry {
    cities: BTreeMap<CityId, City>,
    last_id: CityId,
}

/// A `CityStore` held in memory. Ids are monotonic and never reused.
#[derive(Debug, Default)]
pub struct InMemoryCityStore {
    registry: Mutex<Registry>,
}

impl InMemoryCityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CityStore for InMemoryCityStore {
    async fn insert(&self, name: &str, lat: f64, lon: f64) -> Result<City, StoreError> {
        let mut registry = self.registry();
        if registry.cities.values().any(|c| c.name == name) {
            return Err(StoreError::Conflict(name.to_string()));
        }

        registry.last_id += 1;
        let city = City {
            id: registry.last_id,
            name: name.to_string(),
            lat,
            lon,
        };
        registry.cities.insert(city.id, city.clone());
        Ok(city)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<City>, StoreError> {
        Ok(self
            .registry()
            .cities
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn find_by_id(&self, id: CityId) -> Result<Option<City>, StoreError> {
        Ok(self.registry().cities.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<City>, StoreError> {
        Ok(self.registry().cities.values().cloned().collect())
    }

    async fn delete(&self, id: CityId) -> Result<(), StoreError> {
        self.registry().cities.remove(&id);
        Ok(())
    }
}
