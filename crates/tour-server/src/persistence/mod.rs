//! Persistence layer for tours and stops.
//!
//! SQLite-backed. `Database` is created by the process entry point, injected
//! into the optimizer and the geofence processor, and closed on shutdown.

pub mod db;
pub mod stops;
pub mod tours;

use async_trait::async_trait;
use tour_core::{StopFlagsUpdate, StopOrder, StopRepository, Tour, TourError, TourStatus, TourStop};

pub use db::{init_database, Database};

fn store_error(err: anyhow::Error) -> TourError {
    TourError::persistence(format!("{:#}", err))
}

#[async_trait]
impl StopRepository for Database {
    async fn load_tour(&self, tour_id: &str) -> Result<Option<Tour>, TourError> {
        tours::load_tour(self.pool(), tour_id).await.map_err(store_error)
    }

    async fn load_tour_stops(&self, tour_id: &str) -> Result<Vec<TourStop>, TourError> {
        stops::load_tour_stops(self.pool(), tour_id)
            .await
            .map_err(store_error)
    }

    async fn get_stop(&self, stop_id: &str) -> Result<Option<TourStop>, TourError> {
        stops::load_stop(self.pool(), stop_id).await.map_err(store_error)
    }

    async fn update_stop_flags(
        &self,
        stop_id: &str,
        update: &StopFlagsUpdate,
    ) -> Result<(), TourError> {
        match stops::update_stop_flags(self.pool(), stop_id, update).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TourError::integrity(format!("stop {} not found", stop_id))),
            Err(err) => Err(store_error(err)),
        }
    }

    async fn update_stop_orders(
        &self,
        tour_id: &str,
        orders: &[StopOrder],
    ) -> Result<(), TourError> {
        stops::replace_stop_orders(self.pool(), tour_id, orders)
            .await
            .map_err(|err| match err.downcast::<stops::InvalidOrdering>() {
                Ok(invalid) => TourError::integrity(invalid.to_string()),
                Err(other) => store_error(other),
            })
    }

    async fn set_tour_status(&self, tour_id: &str, status: TourStatus) -> Result<(), TourError> {
        match tours::set_tour_status(self.pool(), tour_id, status).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TourError::integrity(format!("tour {} not found", tour_id))),
            Err(err) => Err(store_error(err)),
        }
    }
}
