//! City service: registration, lookup, deletion, and nearest-city queries.
//!
//! create:  find_by_name → (miss) geocode → insert → invalidate cache
//! nearest: cache → (miss) list_all → haversine rank → cache put

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ProximityCache, ProximityKey, DEFAULT_NEAREST_LIMIT, DEFAULT_NEAREST_TTL};
use crate::distance::{distance, is_valid_coordinate};
use crate::error::ServiceError;
use crate::geocode::GeocodeResolver;
use crate::store::{City, CityId, CityStore, StoreError};

/// Longest accepted city name, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Largest `limit` a nearest query may ask for.
pub const MAX_NEAREST_LIMIT: usize = 50;

/// Orchestrates the store, cache and geocoder. Cheap to share behind an `Arc`.
pub struct CityService {
    store: Arc<dyn CityStore>,
    cache: Arc<dyn ProximityCache>,
    geocoder: Arc<dyn GeocodeResolver>,
    nearest_ttl: Duration,
}

impl CityService {
    pub fn new(
        store: Arc<dyn CityStore>,
        cache: Arc<dyn ProximityCache>,
        geocoder: Arc<dyn GeocodeResolver>,
    ) -> Self {
        Self {
            store,
            cache,
            geocoder,
            nearest_ttl: DEFAULT_NEAREST_TTL,
        }
    }

    pub fn with_nearest_ttl(mut self, ttl: Duration) -> Self {
        self.nearest_ttl = ttl;
        self
    }

    /// Register `name`, or return the existing city with that name.
    ///
    /// The geocoder is only called when the name is unknown.
    pub async fn create(&self, name: &str) -> Result<City, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidInput("city name must not be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "city name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }

        if let Some(existing) = self.store.find_by_name(name).await? {
            tracing::info!(id = existing.id, name, "city already registered");
            return Ok(existing);
        }

        tracing::debug!(name, "geocoding city");
        let coords = self.geocoder.resolve(name).await.map_err(|e| {
            tracing::warn!(name, error = %e, "geocoding failed");
            ServiceError::from(e)
        })?;

        let city = match self.store.insert(name, coords.lat, coords.lon).await {
            Ok(city) => city,
            Err(StoreError::Conflict(_)) => {
                // A concurrent create won the insert; hand back its row.
                return self.store.find_by_name(name).await?.ok_or_else(|| {
                    ServiceError::Persistence(format!("failed to insert city '{}'", name))
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.invalidate().await?;
        tracing::info!(
            id = city.id,
            name = %city.name,
            lat = city.lat,
            lon = city.lon,
            "city created"
        );
        Ok(city)
    }

    /// `Ok(None)` when no city has this id.
    pub async fn get(&self, id: CityId) -> Result<Option<City>, ServiceError> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<City>, ServiceError> {
        Ok(self.store.list_all().await?)
    }

    /// Delete a city. The cache is cleared even if nothing was deleted.
    pub async fn delete(&self, id: CityId) -> Result<(), ServiceError> {
        self.store.delete(id).await?;
        self.invalidate().await?;
        tracing::info!(id, "city deleted");
        Ok(())
    }

    /// Names of the `limit` registered cities closest to `(lat, lon)`, nearest first.
    pub async fn nearest(
        &self,
        lat: f64,
        lon: f64,
        limit: usize,
    ) -> Result<Vec<String>, ServiceError> {
        if !is_valid_coordinate(lat, lon) {
            return Err(ServiceError::InvalidInput(
                "invalid coordinates. Lat: -90..90, Lon: -180..180".into(),
            ));
        }
        if !(1..=MAX_NEAREST_LIMIT).contains(&limit) {
            return Err(ServiceError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_NEAREST_LIMIT
            )));
        }

        let key = ProximityKey::new(lat, lon, limit);
        if let Some(names) = self.cache.get(&key).await? {
            tracing::debug!(%key, "nearest cache hit");
            return Ok(names);
        }

        let cities = self.store.list_all().await?;
        let names = rank_nearest(lat, lon, &cities, limit);
        self.cache.put(&key, &names, self.nearest_ttl).await?;
        tracing::debug!(%key, candidates = cities.len(), "nearest computed");
        Ok(names)
    }

    /// `nearest` with the default limit of two.
    pub async fn nearest_default(&self, lat: f64, lon: f64) -> Result<Vec<String>, ServiceError> {
        self.nearest(lat, lon, DEFAULT_NEAREST_LIMIT).await
    }

    async fn invalidate(&self) -> Result<(), ServiceError> {
        self.cache.invalidate_all().await.map_err(|e| {
            tracing::warn!(error = %e, "proximity cache invalidation failed");
            ServiceError::from(e)
        })?;
        tracing::debug!("proximity cache cleared");
        Ok(())
    }
}

/// Rank `cities` by distance from `(lat, lon)` and keep the first `limit` names.
///
/// Equal distances keep their listing order.
pub fn rank_nearest(lat: f64, lon: f64, cities: &[City], limit: usize) -> Vec<String> {
    let mut ranked: Vec<(f64, &City)> = cities
        .iter()
        .map(|c| (distance(lat, lon, c.lat, c.lon), c))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, c)| c.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, InMemoryProximityCache};
    use crate::geocode::{Coordinates, GeocodeError};
    use crate::store::InMemoryCityStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ─── Doubles ─────────────────────────────────────────────────

    #[derive(Default)]
    struct StaticGeocoder {
        places: HashMap<String, Coordinates>,
        calls: AtomicUsize,
    }

    impl StaticGeocoder {
        fn with(places: &[(&str, f64, f64)]) -> Self {
            Self {
                places: places
                    .iter()
                    .map(|(n, lat, lon)| (n.to_string(), Coordinates::new(*lat, *lon)))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GeocodeResolver for StaticGeocoder {
        async fn resolve(&self, name: &str) -> Result<Coordinates, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.places
                .get(name)
                .copied()
                .ok_or_else(|| GeocodeError::NotFound(name.to_string()))
        }
    }

    struct BrokenGeocoder;

    #[async_trait]
    impl GeocodeResolver for BrokenGeocoder {
        async fn resolve(&self, _name: &str) -> Result<Coordinates, GeocodeError> {
            Err(GeocodeError::ResolutionFailed("API request failed with status 503".into()))
        }
    }

    /// Counts `list_all` calls; optionally hides existing rows from the first
    /// `find_by_name` to simulate losing a create race.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryCityStore,
        list_calls: AtomicUsize,
        hide_first_lookup: AtomicBool,
    }

    impl CountingStore {
        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CityStore for CountingStore {
        async fn insert(&self, name: &str, lat: f64, lon: f64) -> Result<City, StoreError> {
            self.inner.insert(name, lat, lon).await
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<City>, StoreError> {
            if self.hide_first_lookup.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_name(name).await
        }

        async fn find_by_id(&self, id: CityId) -> Result<Option<City>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn list_all(&self) -> Result<Vec<City>, StoreError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_all().await
        }

        async fn delete(&self, id: CityId) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CityStore for FailingStore {
        async fn insert(&self, _name: &str, _lat: f64, _lon: f64) -> Result<City, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn find_by_name(&self, _name: &str) -> Result<Option<City>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn find_by_id(&self, _id: CityId) -> Result<Option<City>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn list_all(&self) -> Result<Vec<City>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn delete(&self, _id: CityId) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    /// Reads and writes work; clearing fails.
    #[derive(Default)]
    struct UnclearableCache {
        inner: InMemoryProximityCache,
    }

    #[async_trait]
    impl ProximityCache for UnclearableCache {
        async fn get(&self, key: &ProximityKey) -> Result<Option<Vec<String>>, CacheError> {
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &ProximityKey,
            names: &[String],
            ttl: Duration,
        ) -> Result<(), CacheError> {
            self.inner.put(key, names, ttl).await
        }

        async fn invalidate_all(&self) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    struct Fixture {
        service: CityService,
        store: Arc<CountingStore>,
        cache: Arc<InMemoryProximityCache>,
        geocoder: Arc<StaticGeocoder>,
    }

    fn fixture(places: &[(&str, f64, f64)]) -> Fixture {
        let store = Arc::new(CountingStore::default());
        let cache = Arc::new(InMemoryProximityCache::new());
        let geocoder = Arc::new(StaticGeocoder::with(places));
        let service = CityService::new(store.clone(), cache.clone(), geocoder.clone());
        Fixture {
            service,
            store,
            cache,
            geocoder,
        }
    }

    fn russia() -> Fixture {
        fixture(&[
            ("Moscow", 55.7522, 37.6156),
            ("Saint Petersburg", 59.9311, 30.3609),
            ("Tver", 56.8587, 35.9176),
            ("Kazan", 55.7887, 49.1221),
        ])
    }

    // ─── create / get / list / delete ───────────────────────────

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let f = russia();
        let first = f.service.create("Moscow").await.unwrap();
        let second = f.service.create("Moscow").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first, second);
        assert_eq!(f.geocoder.calls(), 1);
        assert_eq!(f.service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_trims_name() {
        let f = russia();
        let city = f.service.create("  Moscow ").await.unwrap();
        assert_eq!(city.name, "Moscow");
        assert!((city.lat - 55.7522).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let f = russia();
        let err = f.service.create("   ").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(f.geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_long_name() {
        let f = russia();
        let err = f.service.create(&"x".repeat(MAX_NAME_LEN + 1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_create_unknown_city() {
        let f = russia();
        let err = f.service.create("Atlantis").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(f.service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_geocoder_failure() {
        let service = CityService::new(
            Arc::new(InMemoryCityStore::new()),
            Arc::new(InMemoryProximityCache::new()),
            Arc::new(BrokenGeocoder),
        );
        let err = service.create("Moscow").await.unwrap_err();
        assert!(matches!(err, ServiceError::ResolutionFailed(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_lost_race_returns_existing() {
        let f = russia();
        let existing = f.store.inner.insert("Moscow", 55.7522, 37.6156).await.unwrap();
        f.store.hide_first_lookup.store(true, Ordering::SeqCst);

        let city = f.service.create("Moscow").await.unwrap();
        assert_eq!(city.id, existing.id);
        assert_eq!(f.service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let f = russia();
        let city = f.service.create("Kazan").await.unwrap();
        assert_eq!(f.service.get(city.id).await.unwrap(), Some(city.clone()));

        f.service.delete(city.id).await.unwrap();
        assert_eq!(f.service.get(city.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_ok() {
        let f = russia();
        f.service.delete(12345).await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_not_reused() {
        let f = russia();
        let a = f.service.create("Moscow").await.unwrap();
        f.service.delete(a.id).await.unwrap();
        let b = f.service.create("Moscow").await.unwrap();
        assert_ne!(a.id, b.id);
    }

    // ─── nearest ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_nearest_empty_registry() {
        let f = russia();
        assert!(f.service.nearest_default(55.0, 37.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearest_single_city_not_padded() {
        let f = russia();
        f.service.create("Moscow").await.unwrap();
        assert_eq!(f.service.nearest_default(0.0, 0.0).await.unwrap(), vec!["Moscow"]);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_distance() {
        let f = fixture(&[("A", 0.0, 0.0), ("B", 0.0, 1.0), ("C", 0.0, 10.0)]);
        for name in ["C", "B", "A"] {
            f.service.create(name).await.unwrap();
        }
        assert_eq!(f.service.nearest_default(0.0, 0.0).await.unwrap(), vec!["A", "B"]);
        assert_eq!(f.service.nearest(0.0, 9.0, 3).await.unwrap(), vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_nearest_ties_keep_listing_order() {
        let f = fixture(&[("East", 0.0, 1.0), ("West", 0.0, -1.0), ("North", 1.0, 0.0)]);
        for name in ["East", "West", "North"] {
            f.service.create(name).await.unwrap();
        }
        assert_eq!(f.service.nearest_default(0.0, 0.0).await.unwrap(), vec!["East", "West"]);
    }

    #[tokio::test]
    async fn test_nearest_from_moscow() {
        let f = russia();
        for name in ["Saint Petersburg", "Kazan", "Tver", "Moscow"] {
            f.service.create(name).await.unwrap();
        }
        assert_eq!(
            f.service.nearest_default(55.75, 37.62).await.unwrap(),
            vec!["Moscow", "Tver"]
        );
    }

    #[tokio::test]
    async fn test_nearest_second_call_hits_cache() {
        let f = russia();
        f.service.create("Moscow").await.unwrap();
        f.service.create("Tver").await.unwrap();

        let first = f.service.nearest_default(55.0, 37.0).await.unwrap();
        let second = f.service.nearest_default(55.0, 37.0).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.store.list_calls(), 1);
        assert_eq!(f.cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_invalidates_cache() {
        let f = russia();
        f.service.create("Saint Petersburg").await.unwrap();
        assert_eq!(
            f.service.nearest_default(55.75, 37.62).await.unwrap(),
            vec!["Saint Petersburg"]
        );

        f.service.create("Moscow").await.unwrap();
        assert_eq!(f.cache.entry_count().await, 0);
        assert_eq!(
            f.service.nearest_default(55.75, 37.62).await.unwrap(),
            vec!["Moscow", "Saint Petersburg"]
        );
        assert_eq!(f.store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache() {
        let f = russia();
        let moscow = f.service.create("Moscow").await.unwrap();
        f.service.create("Kazan").await.unwrap();
        assert_eq!(
            f.service.nearest_default(55.75, 37.62).await.unwrap(),
            vec!["Moscow", "Kazan"]
        );

        f.service.delete(moscow.id).await.unwrap();
        assert_eq!(f.cache.entry_count().await, 0);
        assert_eq!(f.service.nearest_default(55.75, 37.62).await.unwrap(), vec!["Kazan"]);
    }

    #[tokio::test]
    async fn test_delete_missing_still_clears_cache() {
        let f = russia();
        f.service.create("Moscow").await.unwrap();
        f.service.nearest_default(1.0, 1.0).await.unwrap();
        assert_eq!(f.cache.entry_count().await, 1);

        f.service.delete(999).await.unwrap();
        assert_eq!(f.cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_idempotent_create_keeps_cache() {
        let f = russia();
        f.service.create("Moscow").await.unwrap();
        f.service.nearest_default(1.0, 1.0).await.unwrap();

        f.service.create("Moscow").await.unwrap();
        assert_eq!(f.cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_cache_recomputes() {
        let f = russia();
        let service = CityService::new(f.store.clone(), f.cache.clone(), f.geocoder.clone())
            .with_nearest_ttl(Duration::from_millis(20));
        service.create("Moscow").await.unwrap();

        service.nearest_default(1.0, 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.nearest_default(1.0, 1.0).await.unwrap();
        assert_eq!(f.store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_nearest_rejects_bad_input() {
        let f = russia();
        for (lat, lon) in [(91.0, 0.0), (0.0, -181.0), (f64::NAN, 0.0)] {
            let err = f.service.nearest_default(lat, lon).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
        let err = f.service.nearest(0.0, 0.0, 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        let err = f.service.nearest(0.0, 0.0, MAX_NEAREST_LIMIT + 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(f.store.list_calls(), 0);
    }

    // ─── collaborator faults ────────────────────────────────────

    #[tokio::test]
    async fn test_store_fault_is_persistence() {
        let geocoder = Arc::new(StaticGeocoder::with(&[("Moscow", 55.7522, 37.6156)]));
        let service = CityService::new(
            Arc::new(FailingStore),
            Arc::new(InMemoryProximityCache::new()),
            geocoder.clone(),
        );

        let errors = [
            service.create("Moscow").await.unwrap_err(),
            service.get(1).await.unwrap_err(),
            service.list().await.unwrap_err(),
            service.delete(1).await.unwrap_err(),
            service.nearest_default(0.0, 0.0).await.unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, ServiceError::Persistence(_)), "{:?}", err);
            assert!(err.is_server_fault());
        }
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalidation_fault_is_unexpected() {
        let f = russia();
        let service = CityService::new(
            f.store.clone(),
            Arc::new(UnclearableCache::default()),
            f.geocoder.clone(),
        );

        let err = service.create("Moscow").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unexpected(_)));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let err = service.delete(1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unexpected(_)));
    }

    #[test]
    fn test_rank_nearest_takes_limit() {
        let cities: Vec<City> = (0..5)
            .map(|i| City {
                id: i,
                name: format!("c{}", i),
                lat: 0.0,
                lon: i as f64,
            })
            .collect();
        assert_eq!(rank_nearest(0.0, 4.0, &cities, 2), vec!["c4", "c3"]);
        assert_eq!(rank_nearest(0.0, 0.0, &cities, 10).len(), 5);
        assert!(rank_nearest(0.0, 0.0, &[], 2).is_empty());
    }
}
