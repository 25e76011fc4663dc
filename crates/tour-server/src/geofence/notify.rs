//! "Next up" and "have left" notifications for a tour stop.
//!
//! Both paths are guarded by idempotency flags stored on the stop. A flag is
//! only raised after at least one dispatch succeeded, so a path that failed
//! entirely can be retried by a later event.

use std::sync::Arc;

use tour_core::messages::{departure_for_seller, next_up_for_agent, next_up_for_seller};
use tour_core::{
    Contact, LocalStateCache, NotificationDispatcher, NotificationRequest, StopFlagsUpdate,
    StopRepository, TourStop, TriggerSource,
};

use crate::state_cache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CustomListing,
    AlreadySent,
    /// No recipient was both configured and opted in.
    NoEligibleRecipient,
    SellerNotificationsDisabled,
    NoSeller,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent { dispatched: usize, flag_written: bool },
    Skipped(SkipReason),
    Failed(String),
}

pub struct Notifier {
    repository: Arc<dyn StopRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    cache: Arc<dyn LocalStateCache>,
}

impl Notifier {
    pub fn new(
        repository: Arc<dyn StopRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        cache: Arc<dyn LocalStateCache>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            cache,
        }
    }

    /// Tell the listing agent and/or seller that `stop` is the next visit.
    pub async fn notify_next_on_tour(&self, stop: &TourStop, source: TriggerSource) -> NotifyOutcome {
        if stop.is_custom_listing {
            tracing::info!(stop_id = %stop.id, "Custom listing; skipping next-up notification");
            return NotifyOutcome::Skipped(SkipReason::CustomListing);
        }
        if stop.next_up_sent {
            tracing::info!(
                stop_id = %stop.id,
                sent_by = stop.next_up_sent_by.as_deref().unwrap_or("unknown"),
                "Next-up notification already sent"
            );
            return NotifyOutcome::Skipped(SkipReason::AlreadySent);
        }

        let sender = self.sender().await;
        let mut attempted = 0;
        let mut dispatched = 0;

        if stop.notify_listing_agent {
            match stop.listing_agent() {
                Some(agent) => {
                    attempted += 1;
                    let request = next_up_for_agent(stop, agent, sender.as_ref());
                    if self.dispatch_guarded(&stop.id, "listing agent", &request).await {
                        dispatched += 1;
                    }
                }
                None => {
                    tracing::info!(stop_id = %stop.id, "No listing agent to notify");
                }
            }
        }

        if stop.notify_seller {
            if let Some(seller) = stop.seller() {
                attempted += 1;
                let request = next_up_for_seller(stop, seller, sender.as_ref());
                if self.dispatch_guarded(&stop.id, "seller", &request).await {
                    dispatched += 1;
                }
            }
        }

        if attempted == 0 {
            tracing::info!(stop_id = %stop.id, "No eligible recipient for next-up notification");
            return NotifyOutcome::Skipped(SkipReason::NoEligibleRecipient);
        }
        if dispatched == 0 {
            return NotifyOutcome::Failed(format!(
                "all {} next-up dispatches failed for stop {}",
                attempted, stop.id
            ));
        }

        let flag_written = self
            .record_flags(stop, StopFlagsUpdate::next_up(source))
            .await;
        NotifyOutcome::Sent {
            dispatched,
            flag_written,
        }
    }

    /// Tell the seller the visitors have left `stop`.
    pub async fn notify_seller_of_departure(
        &self,
        stop: &TourStop,
        source: TriggerSource,
    ) -> NotifyOutcome {
        if stop.is_custom_listing {
            tracing::info!(stop_id = %stop.id, "Custom listing; skipping departure notification");
            return NotifyOutcome::Skipped(SkipReason::CustomListing);
        }
        if stop.have_left_sent {
            tracing::info!(stop_id = %stop.id, "Departure notification already sent");
            return NotifyOutcome::Skipped(SkipReason::AlreadySent);
        }
        if !stop.notify_seller {
            tracing::debug!(stop_id = %stop.id, "Seller opted out of departure notifications");
            return NotifyOutcome::Skipped(SkipReason::SellerNotificationsDisabled);
        }
        let Some(seller) = stop.seller() else {
            tracing::info!(stop_id = %stop.id, "No seller on listing; skipping departure notification");
            return NotifyOutcome::Skipped(SkipReason::NoSeller);
        };

        let sender = self.sender().await;
        let request = departure_for_seller(stop, seller, sender.as_ref());
        if !self.dispatch_guarded(&stop.id, "seller", &request).await {
            return NotifyOutcome::Failed(format!("departure dispatch failed for stop {}", stop.id));
        }

        let flag_written = self
            .record_flags(stop, StopFlagsUpdate::have_left(source))
            .await;
        NotifyOutcome::Sent {
            dispatched: 1,
            flag_written,
        }
    }

    async fn sender(&self) -> Option<Contact> {
        match state_cache::load_current_user(self.cache.as_ref()).await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!("Current user unavailable: {}", err);
                None
            }
        }
    }

    async fn dispatch_guarded(
        &self,
        stop_id: &str,
        audience: &str,
        request: &NotificationRequest,
    ) -> bool {
        match self.dispatcher.dispatch(request).await {
            Ok(()) => {
                tracing::info!(stop_id, user_id = %request.user_id, "Notified {}", audience);
                true
            }
            Err(err) => {
                tracing::error!(
                    stop_id,
                    user_id = %request.user_id,
                    "Failed to notify {}: {}",
                    audience,
                    err
                );
                false
            }
        }
    }

    /// Single flag write, then best-effort write-through to the cached stop.
    async fn record_flags(&self, stop: &TourStop, update: StopFlagsUpdate) -> bool {
        if let Err(err) = self.repository.update_stop_flags(&stop.id, &update).await {
            tracing::error!(stop_id = %stop.id, "Failed to record notification flags: {}", err);
            return false;
        }

        let mut updated = stop.clone();
        updated.apply_flags(&update);
        if let Err(err) = state_cache::patch_cached_stop(self.cache.as_ref(), &updated).await {
            tracing::warn!(stop_id = %stop.id, "Cached stop not updated: {}", err);
        }
        true
    }
}
