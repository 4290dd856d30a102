//! Geocoding providers: Geoapify over HTTPS, and a built-in offline dataset.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::types::{Coordinates, GeocodeError};
use super::GeocodeResolver;
use crate::distance::is_valid_coordinate;

pub const DEFAULT_GEOCODE_URL: &str = "https://api.geoapify.com/v1/geocode/search";
pub const DEFAULT_GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = "CityRegistry/0.1";

// ─── Geoapify ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeoapifyResponse {
    #[serde(default)]
    features: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct GeoapifyFeature {
    properties: GeoapifyProperties,
}

#[derive(Debug, Deserialize)]
struct GeoapifyProperties {
    lat: f64,
    lon: f64,
}

/// Parse a Geoapify search response body. Only the first feature is used.
pub fn parse_geoapify_response(query: &str, body: &str) -> Result<Coordinates, GeocodeError> {
    let response: GeoapifyResponse = serde_json::from_str(body)
        .map_err(|e| GeocodeError::ResolutionFailed(format!("malformed response: {}", e)))?;

    let first = response
        .features
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::NotFound(query.to_string()))?;

    let feature: GeoapifyFeature = serde_json::from_value(first)
        .map_err(|e| GeocodeError::ResolutionFailed(format!("malformed feature: {}", e)))?;

    let GeoapifyProperties { lat, lon } = feature.properties;
    if !is_valid_coordinate(lat, lon) {
        return Err(GeocodeError::ResolutionFailed(format!(
            "provider returned out-of-range coordinates ({}, {})",
            lat, lon
        )));
    }

    Ok(Coordinates::new(lat, lon))
}

/// Resolves city names through the Geoapify geocoding API.
///
/// The HTTP call is blocking (`ureq`) and runs on tokio's blocking pool.
/// Every request is bounded by the agent timeout; a timeout surfaces as
/// `ResolutionFailed`.
#[derive(Debug, Clone)]
pub struct GeoapifyResolver {
    agent: ureq::Agent,
    endpoint: String,
    api_key: SecretString,
}

impl GeoapifyResolver {
    pub fn new(api_key: SecretString) -> Self {
        Self::with_endpoint(DEFAULT_GEOCODE_URL, api_key, DEFAULT_GEOCODE_TIMEOUT)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn resolve_blocking(&self, query: &str) -> Result<Coordinates, GeocodeError> {
        let response = self
            .agent
            .get(&self.endpoint)
            .query("text", query)
            .query("apiKey", self.api_key.expose_secret())
            .call();

        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => {
                return Err(GeocodeError::ResolutionFailed(format!(
                    "API request failed with status {}",
                    code
                )));
            }
            // The transport error's Display embeds the URL (and the key); report the kind only.
            Err(ureq::Error::Transport(t)) => {
                return Err(GeocodeError::ResolutionFailed(format!(
                    "request failed: {}",
                    t.kind()
                )));
            }
        };

        let body = response
            .into_string()
            .map_err(|e| GeocodeError::ResolutionFailed(format!("unreadable response: {}", e)))?;

        parse_geoapify_response(query, &body)
    }
}

#[async_trait]
impl GeocodeResolver for GeoapifyResolver {
    async fn resolve(&self, name: &str) -> Result<Coordinates, GeocodeError> {
        let resolver = self.clone();
        let query = name.to_string();
        tokio::task::spawn_blocking(move || resolver.resolve_blocking(&query))
            .await
            .map_err(|e| GeocodeError::ResolutionFailed(format!("geocode task failed: {}", e)))?
    }
}

// ─── Built-in dataset ───────────────────────────────────────────

struct BuiltinCity {
    names: &'static [&'static str], // canonical + aliases
    lat: f64,
    lon: f64,
}

const BUILTIN_CITIES: &[BuiltinCity] = &[
    BuiltinCity {
        names: &["moscow", "moskva", "москва"],
        lat: 55.7522,
        lon: 37.6156,
    },
    BuiltinCity {
        names: &[
            "saint petersburg",
            "st petersburg",
            "st. petersburg",
            "санкт-петербург",
        ],
        lat: 59.9311,
        lon: 30.3609,
    },
    BuiltinCity {
        names: &["kazan", "казань"],
        lat: 55.7887,
        lon: 49.1221,
    },
    BuiltinCity {
        names: &["novosibirsk", "новосибирск"],
        lat: 55.0084,
        lon: 82.9357,
    },
    BuiltinCity {
        names: &["yekaterinburg", "ekaterinburg", "екатеринбург"],
        lat: 56.8389,
        lon: 60.6057,
    },
    BuiltinCity {
        names: &["tver", "тверь"],
        lat: 56.8587,
        lon: 35.9176,
    },
    BuiltinCity {
        names: &["london"],
        lat: 51.5074,
        lon: -0.1278,
    },
    BuiltinCity {
        names: &["paris"],
        lat: 48.8566,
        lon: 2.3522,
    },
    BuiltinCity {
        names: &["berlin"],
        lat: 52.5200,
        lon: 13.4050,
    },
    BuiltinCity {
        names: &["stockholm"],
        lat: 59.3293,
        lon: 18.0686,
    },
    BuiltinCity {
        names: &["istanbul"],
        lat: 41.0082,
        lon: 28.9784,
    },
    BuiltinCity {
        names: &["cairo"],
        lat: 30.0444,
        lon: 31.2357,
    },
    BuiltinCity {
        names: &["new york", "nyc"],
        lat: 40.7128,
        lon: -74.0060,
    },
    BuiltinCity {
        names: &["tokyo"],
        lat: 35.6762,
        lon: 139.6503,
    },
    BuiltinCity {
        names: &["sydney"],
        lat: -33.8688,
        lon: 151.2093,
    },
    BuiltinCity {
        names: &["sao paulo", "são paulo"],
        lat: -23.5505,
        lon: -46.6333,
    },
];

/// Offline resolver backed by a small table of well-known cities.
///
/// Matching is case-insensitive on the canonical name or an alias. Misspellings
/// are not corrected, so a typo never registers as a second copy of a city.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinResolver;

impl BuiltinResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn lookup(&self, query: &str) -> Option<Coordinates> {
        let q = query.trim().to_lowercase();
        BUILTIN_CITIES
            .iter()
            .find(|c| c.names.contains(&q.as_str()))
            .map(|c| Coordinates::new(c.lat, c.lon))
    }
}

#[async_trait]
impl GeocodeResolver for BuiltinResolver {
    async fn resolve(&self, name: &str) -> Result<Coordinates, GeocodeError> {
        self.lookup(name)
            .ok_or_else(|| GeocodeError::NotFound(name.to_string()))
    }
}
