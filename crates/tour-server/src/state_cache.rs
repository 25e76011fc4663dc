//! On-device state used by background geofence handling.
//!
//! Holds the last-seen region states, a snapshot of the active tour's stops
//! and the signed-in user, so an event can be handled without the network.
//! Semantics are last-write-wins; concurrent handlers may overwrite each other.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;

use tour_core::{Contact, LocalStateCache, RegionStates, TourError, TourStop};

pub const REGION_STATES_KEY: &str = "geofence_region_states";
pub const ACTIVE_STOPS_KEY: &str = "active_tour_stops";
pub const CURRENT_USER_KEY: &str = "current_user";

/// One JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStateCache {
    dir: PathBuf,
}

impl FileStateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> TourError {
    TourError::persistence(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl LocalStateCache for FileStateCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, TourError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| io_error(&path, err))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TourError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| io_error(&self.dir, err))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(&value).map_err(|err| io_error(&path, err))?;
        fs::write(&tmp, payload)
            .await
            .map_err(|err| io_error(&tmp, err))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|err| io_error(&path, err))
    }
}

/// Process-local cache, for tests and runs without a state directory.
#[derive(Debug, Default)]
pub struct MemoryStateCache {
    entries: DashMap<String, Value>,
}

impl MemoryStateCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStateCache for MemoryStateCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, TourError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TourError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

async fn load_typed<T: DeserializeOwned>(
    cache: &dyn LocalStateCache,
    key: &str,
) -> Result<Option<T>, TourError> {
    match cache.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|err| TourError::persistence(format!("cached {} is corrupt: {}", key, err))),
        None => Ok(None),
    }
}

async fn save_typed<T: Serialize>(
    cache: &dyn LocalStateCache,
    key: &str,
    value: &T,
) -> Result<(), TourError> {
    let value = serde_json::to_value(value)
        .map_err(|err| TourError::persistence(format!("cannot encode {}: {}", key, err)))?;
    cache.set(key, value).await
}

pub async fn load_region_states(cache: &dyn LocalStateCache) -> Result<RegionStates, TourError> {
    Ok(load_typed(cache, REGION_STATES_KEY).await?.unwrap_or_default())
}

pub async fn save_region_states(
    cache: &dyn LocalStateCache,
    states: &RegionStates,
) -> Result<(), TourError> {
    save_typed(cache, REGION_STATES_KEY, states).await
}

pub async fn load_cached_stops(cache: &dyn LocalStateCache) -> Result<Vec<TourStop>, TourError> {
    Ok(load_typed(cache, ACTIVE_STOPS_KEY).await?.unwrap_or_default())
}

pub async fn save_cached_stops(
    cache: &dyn LocalStateCache,
    stops: &[TourStop],
) -> Result<(), TourError> {
    save_typed(cache, ACTIVE_STOPS_KEY, &stops).await
}

/// Replace one stop in the cached snapshot, if present.
pub async fn patch_cached_stop(
    cache: &dyn LocalStateCache,
    stop: &TourStop,
) -> Result<(), TourError> {
    let mut stops = load_cached_stops(cache).await?;
    let Some(slot) = stops.iter_mut().find(|cached| cached.id == stop.id) else {
        return Ok(());
    };
    *slot = stop.clone();
    save_cached_stops(cache, &stops).await
}

pub async fn load_current_user(cache: &dyn LocalStateCache) -> Result<Option<Contact>, TourError> {
    load_typed(cache, CURRENT_USER_KEY).await
}

pub async fn save_current_user(
    cache: &dyn LocalStateCache,
    user: &Contact,
) -> Result<(), TourError> {
    save_typed(cache, CURRENT_USER_KEY, user).await
}
