//! Background handler for geofence enter/exit deliveries.
//!
//! `handle` always completes: each external call is contained in the step
//! that makes it, and a failure only degrades that step. The host may
//! redeliver, reorder or interleave events for different regions.

use std::sync::Arc;

use tracing::Instrument;

use tour_core::{
    GeofenceDelivery, GeofenceEventType, LocalStateCache, NotificationDispatcher, Observation,
    StopRepository, TourStop, TriggerSource,
};

use super::notify::{Notifier, NotifyOutcome};
use crate::state_cache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The host reported an error instead of an event.
    DeliveryError,
    /// Same event as the last one recorded for this region.
    Duplicate,
    /// First event ever seen for this region; recorded only.
    FirstObservation,
    /// No cached stop matches the region.
    UnknownRegion,
    Handled(SideEffects),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEffects {
    pub next_stop_id: Option<String>,
    pub next_up: Option<NotifyOutcome>,
    pub departure: Option<NotifyOutcome>,
}

/// Early exit of the pipeline with the outcome to report.
type Step<T> = Result<T, ProcessOutcome>;

pub struct GeofenceProcessor {
    repository: Arc<dyn StopRepository>,
    cache: Arc<dyn LocalStateCache>,
    notifier: Notifier,
}

impl GeofenceProcessor {
    pub fn new(
        repository: Arc<dyn StopRepository>,
        cache: Arc<dyn LocalStateCache>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let notifier = Notifier::new(repository.clone(), dispatcher, cache.clone());
        Self {
            repository,
            cache,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub async fn handle(&self, delivery: GeofenceDelivery) -> ProcessOutcome {
        let (event_type, region_id) = match check_delivery(delivery) {
            Ok(event) => event,
            Err(outcome) => return outcome,
        };

        let span = tracing::info_span!(
            "geofence_event",
            region_id = %region_id,
            event_type = %event_type
        );
        let outcome = self.run(event_type, &region_id).instrument(span).await;
        tracing::debug!(region_id = %region_id, event_type = %event_type, ?outcome, "Geofence event processed");
        outcome
    }

    async fn run(&self, event_type: GeofenceEventType, region_id: &str) -> ProcessOutcome {
        match self.pipeline(event_type, region_id).await {
            Ok(effects) => ProcessOutcome::Handled(effects),
            Err(outcome) => outcome,
        }
    }

    async fn pipeline(&self, event_type: GeofenceEventType, region_id: &str) -> Step<SideEffects> {
        self.record_region_state(region_id, event_type).await?;
        let (current, next) = self.resolve_stops(region_id).await?;

        let next = match next {
            Some(stop) => Some(self.refresh_stop(stop).await),
            None => None,
        };

        let next_up = match &next {
            Some(stop) => self.evaluate_next_up(event_type, stop).await,
            None => None,
        };
        let departure = self.evaluate_departure(event_type, current).await;

        Ok(SideEffects {
            next_stop_id: next.map(|stop| stop.id),
            next_up,
            departure,
        })
    }

    /// Dedup against the cached region state and record the new one.
    async fn record_region_state(
        &self,
        region_id: &str,
        event_type: GeofenceEventType,
    ) -> Step<()> {
        // An unreadable map is never written back.
        let mut states = match state_cache::load_region_states(self.cache.as_ref()).await {
            Ok(states) => states,
            Err(err) => {
                tracing::warn!("Region state unavailable, treating event as unseen: {}", err);
                return Err(ProcessOutcome::FirstObservation);
            }
        };

        let observation = states.observe(region_id, event_type);
        if observation == Observation::Duplicate {
            tracing::debug!("Duplicate geofence event ignored");
            return Err(ProcessOutcome::Duplicate);
        }

        if let Err(err) = state_cache::save_region_states(self.cache.as_ref(), &states).await {
            tracing::warn!("Failed to record region state: {}", err);
        }

        match observation {
            Observation::First => {
                tracing::info!("First observation for region; recorded without side effects");
                Err(ProcessOutcome::FirstObservation)
            }
            Observation::Changed { previous } => {
                tracing::info!(previous = %previous, "Region state changed");
                Ok(())
            }
            Observation::Duplicate => Err(ProcessOutcome::Duplicate),
        }
    }

    /// Current stop by region id, next stop by `order + 1`, from the cached list.
    async fn resolve_stops(&self, region_id: &str) -> Step<(TourStop, Option<TourStop>)> {
        let stops = match state_cache::load_cached_stops(self.cache.as_ref()).await {
            Ok(stops) => stops,
            Err(err) => {
                tracing::error!("Cached stops unavailable: {}", err);
                return Err(ProcessOutcome::UnknownRegion);
            }
        };

        let Some(current) = stops.iter().find(|stop| stop.id == region_id).cloned() else {
            tracing::warn!("No cached stop for region");
            return Err(ProcessOutcome::UnknownRegion);
        };
        let next = stops
            .iter()
            .find(|stop| stop.order == current.order + 1)
            .cloned();

        Ok((current, next))
    }

    /// Prefer the store's copy of a stop; fall back to the cached one.
    async fn refresh_stop(&self, cached: TourStop) -> TourStop {
        match self.repository.get_stop(&cached.id).await {
            Ok(Some(fresh)) => {
                if let Err(err) = state_cache::patch_cached_stop(self.cache.as_ref(), &fresh).await {
                    tracing::warn!(stop_id = %fresh.id, "Cached stop not refreshed: {}", err);
                }
                fresh
            }
            Ok(None) => {
                tracing::warn!(stop_id = %cached.id, "Stop missing from store; using cached copy");
                cached
            }
            Err(err) => {
                tracing::warn!(stop_id = %cached.id, "Stop refresh failed; using cached copy: {}", err);
                cached
            }
        }
    }

    async fn evaluate_next_up(
        &self,
        event_type: GeofenceEventType,
        next: &TourStop,
    ) -> Option<NotifyOutcome> {
        let wanted = match event_type {
            GeofenceEventType::Enter => next.notify_before,
            GeofenceEventType::Exit => next.notify_after,
        };
        if !wanted {
            return None;
        }
        Some(
            self.notifier
                .notify_next_on_tour(next, TriggerSource::GeofenceTrigger)
                .await,
        )
    }

    /// Departure is checked against the store's copy of the current stop.
    async fn evaluate_departure(
        &self,
        event_type: GeofenceEventType,
        current: TourStop,
    ) -> Option<NotifyOutcome> {
        if event_type != GeofenceEventType::Exit {
            return None;
        }
        let current = self.refresh_stop(current).await;
        Some(
            self.notifier
                .notify_seller_of_departure(&current, TriggerSource::GeofenceTrigger)
                .await,
        )
    }
}

fn check_delivery(delivery: GeofenceDelivery) -> Step<(GeofenceEventType, String)> {
    match delivery {
        GeofenceDelivery::Event { event_type, region } => Ok((event_type, region.identifier)),
        GeofenceDelivery::Error { error } => {
            tracing::error!("Geofence delivery error: {}", error);
            Err(ProcessOutcome::DeliveryError)
        }
    }
}
