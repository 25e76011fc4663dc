//! Tour start/complete transitions and the on-device snapshot they prepare.

use std::sync::Arc;

use tour_core::{
    regions_for_stops, Contact, GeofenceRegion, LocalStateCache, RegionStates, StopRepository,
    Tour, TourError, TourStatus, TourStop,
};

use crate::state_cache;

pub struct TourLifecycle {
    repository: Arc<dyn StopRepository>,
    cache: Arc<dyn LocalStateCache>,
    region_radius_m: f64,
}

impl TourLifecycle {
    pub fn new(
        repository: Arc<dyn StopRepository>,
        cache: Arc<dyn LocalStateCache>,
        region_radius_m: f64,
    ) -> Self {
        Self {
            repository,
            cache,
            region_radius_m,
        }
    }

    async fn load(&self, tour_id: &str) -> Result<Tour, TourError> {
        self.repository
            .load_tour(tour_id)
            .await?
            .ok_or_else(|| TourError::integrity(format!("tour {} not found", tour_id)))
    }

    /// Start (or resume) a tour and return the regions the host should monitor.
    ///
    /// A fresh start clears region states left over from an earlier tour; a
    /// resume keeps them so already-seen regions are not treated as new.
    pub async fn start_tour(
        &self,
        tour_id: &str,
        current_user: Option<&Contact>,
    ) -> Result<Vec<GeofenceRegion>, TourError> {
        let tour = self.load(tour_id).await?;
        let resuming = match tour.status {
            TourStatus::NotStarted => false,
            TourStatus::InProgress => true,
            TourStatus::Complete => {
                return Err(TourError::integrity(format!(
                    "tour {} is already complete",
                    tour_id
                )))
            }
        };

        let stops = self.repository.load_tour_stops(tour_id).await?;
        check_contiguous(tour_id, &stops)?;

        if !resuming {
            self.repository
                .set_tour_status(tour_id, TourStatus::InProgress)
                .await?;
            state_cache::save_region_states(self.cache.as_ref(), &RegionStates::new()).await?;
        }
        state_cache::save_cached_stops(self.cache.as_ref(), &stops).await?;
        if let Some(user) = current_user {
            state_cache::save_current_user(self.cache.as_ref(), user).await?;
        }

        tracing::info!(tour_id, stops = stops.len(), resuming, "Tour started");
        Ok(regions_for_stops(&stops, self.region_radius_m))
    }

    pub async fn complete_tour(&self, tour_id: &str) -> Result<(), TourError> {
        let tour = self.load(tour_id).await?;
        if !tour.status.can_transition_to(TourStatus::Complete) {
            return Err(TourError::integrity(format!(
                "tour {} cannot move from {} to complete",
                tour_id,
                tour.status.as_str()
            )));
        }
        self.repository
            .set_tour_status(tour_id, TourStatus::Complete)
            .await?;
        tracing::info!(tour_id, "Tour complete");
        Ok(())
    }
}

/// Orders must be exactly `1..=N` before geofencing relies on `order + 1`.
fn check_contiguous(tour_id: &str, stops: &[TourStop]) -> Result<(), TourError> {
    let mut orders: Vec<i64> = stops.iter().map(|stop| stop.order).collect();
    orders.sort_unstable();
    let contiguous = orders
        .iter()
        .enumerate()
        .all(|(idx, order)| *order == idx as i64 + 1);
    if stops.is_empty() || !contiguous {
        return Err(TourError::integrity(format!(
            "tour {} stop orders are not 1..{}",
            tour_id,
            stops.len()
        )));
    }
    Ok(())
}
