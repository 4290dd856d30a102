use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use city_registry::cache::{
    CacheError, InMemoryProximityCache, ProximityCache, RedisProximityCache,
};
use city_registry::config::{Config, ConfigError};
use city_registry::distance::distance;
use city_registry::geocode::{
    BuiltinResolver, GeoapifyResolver, GeocodeError, GeocodeResolver,
};
use city_registry::store::{CityStore, InMemoryCityStore, PgCityStore, StoreError};
use city_registry::{server, CityService};

/// City registry: register cities by name and find the nearest ones to a point.
///
/// Examples:
///   cityreg serve --port 8000
///   cityreg --offline serve
///   cityreg resolve "Saint Petersburg"
///   cityreg distance 55.7522 37.6156 59.9311 30.3609
#[derive(Parser)]
#[command(name = "cityreg", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Use the built-in city table instead of the Geoapify API.
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Bind address, overrides HOST.
        #[arg(long)]
        host: Option<String>,

        /// Listen port, overrides PORT.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Geocode a city name and print its coordinates as JSON.
    Resolve { name: String },

    /// Print the great-circle distance in kilometers between two points.
    Distance {
        #[arg(allow_hyphen_values = true)]
        lat1: f64,
        #[arg(allow_hyphen_values = true)]
        lon1: f64,
        #[arg(allow_hyphen_values = true)]
        lat2: f64,
        #[arg(allow_hyphen_values = true)]
        lon2: f64,
    },
}

#[derive(Debug, Error)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("{0}")]
    Geocode(#[from] GeocodeError),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Output error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    name: &'a str,
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct DistanceOutput {
    km: f64,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "city_registry=info,cityreg=info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            let mut config = Config::from_env(cli.offline)?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            tracing::debug!(?config, "configuration loaded");
            serve(config).await
        }
        Command::Resolve { name } => {
            let config = Config::from_env(cli.offline)?;
            let coords = build_geocoder(&config).resolve(name.trim()).await?;
            let output = ResolveOutput {
                name: name.trim(),
                lat: coords.lat,
                lon: coords.lon,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Distance { lat1, lon1, lat2, lon2 } => {
            let output = DistanceOutput {
                km: distance(lat1, lon1, lat2, lon2),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<(), AppError> {
    let store = build_store(&config).await?;
    let cache = build_cache(&config).await?;
    let geocoder = build_geocoder(&config);

    let service =
        CityService::new(store, cache, geocoder).with_nearest_ttl(config.near_cache_ttl);
    server::start(&config.bind_addr(), service).await?;
    Ok(())
}

fn build_geocoder(config: &Config) -> Arc<dyn GeocodeResolver> {
    match &config.api_key {
        Some(key) => Arc::new(GeoapifyResolver::with_endpoint(
            &config.geocode_url,
            key.clone(),
            config.geocode_timeout,
        )),
        None => {
            tracing::warn!("Offline mode: resolving cities from the built-in table");
            Arc::new(BuiltinResolver::new())
        }
    }
}

async fn build_store(config: &Config) -> Result<Arc<dyn CityStore>, AppError> {
    match &config.database {
        Some(database) => {
            let store = PgCityStore::connect(database.connect_options()?).await?;
            store.ensure_schema().await?;
            tracing::info!("Database pool created");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No database configured; cities are kept in memory");
            Ok(Arc::new(InMemoryCityStore::new()))
        }
    }
}

async fn build_cache(config: &Config) -> Result<Arc<dyn ProximityCache>, AppError> {
    match &config.redis_url {
        Some(url) => {
            let cache = RedisProximityCache::connect(url).await?;
            tracing::info!("Redis pool created");
            Ok(Arc::new(cache))
        }
        None => {
            tracing::info!("No Redis configured; using the in-memory proximity cache");
            Ok(Arc::new(InMemoryProximityCache::new()))
        }
    }
}
