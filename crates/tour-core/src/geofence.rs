//! Per-region dedup state and monitored region derivation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, GeofenceEventType, TourStop};

/// Last observed event per region id (== tour stop id).
///
/// Used only to drop redelivered events; tour progress lives elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionStates {
    states: HashMap<String, GeofenceEventType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Same event as last time. Nothing recorded.
    Duplicate,
    /// No prior state. Recorded, but no side effects.
    First,
    /// Genuine transition. Recorded; side effects should run.
    Changed { previous: GeofenceEventType },
}

impl RegionStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, region_id: &str) -> Option<GeofenceEventType> {
        self.states.get(region_id).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn observe(&mut self, region_id: &str, event: GeofenceEventType) -> Observation {
        match self.states.insert(region_id.to_string(), event) {
            None => Observation::First,
            Some(previous) if previous == event => Observation::Duplicate,
            Some(previous) => Observation::Changed { previous },
        }
    }
}

/// Circular region the host should monitor for a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceRegion {
    pub identifier: String,
    pub center: Coordinates,
    pub radius_m: f64,
}

pub fn regions_for_stops(stops: &[TourStop], radius_m: f64) -> Vec<GeofenceRegion> {
    let mut ordered: Vec<&TourStop> = stops.iter().collect();
    ordered.sort_by_key(|stop| stop.order);
    ordered
        .into_iter()
        .map(|stop| GeofenceRegion {
            identifier: stop.id.clone(),
            center: stop.location,
            radius_m,
        })
        .collect()
}
