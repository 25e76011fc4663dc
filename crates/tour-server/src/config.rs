//! Process configuration from environment.

use std::env;

use tour_clients::{DirectionsConfig, NotifyConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub database_max_connections: u32,
    pub state_cache_dir: String,
    pub maps_api_url: String,
    pub maps_api_key: String,
    pub maps_timeout_secs: u64,
    pub route_max_attempts: u32,
    pub route_retry_base_ms: u64,
    pub route_retry_max_ms: u64,
    pub route_max_concurrency: usize,
    pub notify_api_url: String,
    pub notify_api_token: String,
    pub notify_timeout_secs: u64,
    pub geofence_radius_m: f64,
    pub log_json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_path: env::var("TOUR_DATABASE_PATH")
                .unwrap_or_else(|_| "data/tours.db".to_string()),
            database_max_connections: env_or("TOUR_DATABASE_MAX_CONNECTIONS", 5),
            state_cache_dir: env::var("TOUR_STATE_CACHE_DIR")
                .unwrap_or_else(|_| "data/state".to_string()),
            maps_api_url: env::var("MAPS_API_URL")
                .unwrap_or_else(|_| "https://maps.googleapis.com".to_string()),
            maps_api_key: env::var("MAPS_API_KEY").unwrap_or_default(),
            maps_timeout_secs: env_or("MAPS_TIMEOUT_SECS", 10),
            route_max_attempts: env_or("ROUTE_MAX_ATTEMPTS", 3),
            route_retry_base_ms: env_or("ROUTE_RETRY_BASE_MS", 250),
            route_retry_max_ms: env_or("ROUTE_RETRY_MAX_MS", 2_000),
            route_max_concurrency: env_or("ROUTE_MAX_CONCURRENCY", 8),
            notify_api_url: env::var("NOTIFY_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            notify_api_token: env::var("NOTIFY_API_TOKEN").unwrap_or_default(),
            notify_timeout_secs: env_or("NOTIFY_TIMEOUT_SECS", 10),
            geofence_radius_m: env_or("GEOFENCE_RADIUS_M", 100.0),
            log_json: env::var("TOUR_LOG_JSON")
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn directions(&self) -> DirectionsConfig {
        DirectionsConfig {
            base_url: self.maps_api_url.clone(),
            api_key: self.maps_api_key.clone(),
            timeout_secs: self.maps_timeout_secs,
        }
    }

    pub fn notify(&self) -> NotifyConfig {
        NotifyConfig {
            base_url: self.notify_api_url.clone(),
            api_token: self.notify_api_token.clone(),
            timeout_secs: self.notify_timeout_secs,
        }
    }
}
