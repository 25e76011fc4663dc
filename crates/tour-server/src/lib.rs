//! Shared library surface for the tour server binary and its tests.

pub mod backoff;
pub mod config;
pub mod geofence;
pub mod persistence;
pub mod route_optimizer;
pub mod state_cache;
pub mod tours;
