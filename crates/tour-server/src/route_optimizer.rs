//! Tour ordering against the directions service.
//!
//! Every non-start stop is tried as the last stop; the directions service
//! orders the rest. Calls run concurrently and independently, then the
//! cheapest complete ordering is written back in one transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use tour_core::error::NO_VIABLE_ROUTE;
use tour_core::route_selection::{build_candidates, candidate_from_response, select_best, split_start};
use tour_core::{
    CandidatePlan, MappingOracle, OptimizedRoute, RouteCandidate, StopRepository, TourError,
    TourStatus, TourStop,
};

use crate::backoff::{retry_with_backoff, RetryPolicy};
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub retry: RetryPolicy,
    pub max_concurrency: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrency: 8,
        }
    }
}

impl From<&Config> for OptimizerConfig {
    fn from(config: &Config) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.route_max_attempts,
                attempt_timeout: Duration::from_secs(config.maps_timeout_secs.max(1)),
                base_delay: Duration::from_millis(config.route_retry_base_ms),
                max_delay: Duration::from_millis(config.route_retry_max_ms),
            },
            max_concurrency: config.route_max_concurrency,
        }
    }
}

pub struct RouteOptimizer {
    oracle: Arc<dyn MappingOracle>,
    repository: Arc<dyn StopRepository>,
    config: OptimizerConfig,
}

impl RouteOptimizer {
    pub fn new(
        oracle: Arc<dyn MappingOracle>,
        repository: Arc<dyn StopRepository>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            oracle,
            repository,
            config,
        }
    }

    /// Compute the best visiting order without persisting it.
    pub async fn optimize(&self, stops: &[TourStop]) -> Result<OptimizedRoute, TourError> {
        let (start, pool) = split_start(stops)?;

        if pool.is_empty() {
            return Ok(OptimizedRoute {
                stop_order: vec![start.id.clone()],
                total_time_s: 0,
                total_distance_m: 0,
                candidates_evaluated: 0,
                candidates_failed: 0,
                computed_at: Utc::now(),
            });
        }

        let plans = build_candidates(start, &pool);
        let evaluated = plans.len();
        tracing::debug!(
            start_stop = %start.id,
            candidates = evaluated,
            "Evaluating route candidates"
        );

        let outcomes: Vec<Option<RouteCandidate>> = stream::iter(plans)
            .map(|plan| async move { self.evaluate(plan).await })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let candidates: Vec<RouteCandidate> = outcomes.into_iter().flatten().collect();
        let failed = evaluated - candidates.len();

        if candidates.is_empty() {
            return Err(TourError::integrity(format!(
                "{} ({} of {} candidates failed)",
                NO_VIABLE_ROUTE, failed, evaluated
            )));
        }

        let best = select_best(candidates)?;
        tracing::info!(
            end_stop = %best.end_stop_id,
            total_time_s = best.total_time_s,
            total_distance_m = best.total_distance_m,
            failed,
            "Selected route"
        );

        Ok(OptimizedRoute {
            stop_order: best.stop_order,
            total_time_s: best.total_time_s,
            total_distance_m: best.total_distance_m,
            candidates_evaluated: evaluated,
            candidates_failed: failed,
            computed_at: Utc::now(),
        })
    }

    /// Load a tour's stops, optimize, and persist `order = 1..N` atomically.
    pub async fn optimize_tour(&self, tour_id: &str) -> Result<OptimizedRoute, TourError> {
        let tour = self
            .repository
            .load_tour(tour_id)
            .await?
            .ok_or_else(|| TourError::integrity(format!("tour {} not found", tour_id)))?;
        if tour.status == TourStatus::Complete {
            return Err(TourError::integrity(format!(
                "tour {} is already complete",
                tour_id
            )));
        }

        let stops = self.repository.load_tour_stops(tour_id).await?;
        let route = self.optimize(&stops).await?;

        if route.stop_order.len() != stops.len() {
            return Err(TourError::integrity(format!(
                "route covers {} of {} stops",
                route.stop_order.len(),
                stops.len()
            )));
        }

        self.repository
            .update_stop_orders(tour_id, &route.stop_orders())
            .await?;
        tracing::info!(tour_id, stops = stops.len(), "Persisted optimized stop order");

        Ok(route)
    }

    /// One candidate. A failure is logged and reported as `None`.
    async fn evaluate(&self, plan: CandidatePlan) -> Option<RouteCandidate> {
        let label = format!("directions for candidate ending at {}", plan.end_id);
        let oracle = &self.oracle;
        let request = &plan.request;

        let response = retry_with_backoff(&self.config.retry, &label, || {
            oracle.optimize_waypoints(request)
        })
        .await
        .and_then(|response| candidate_from_response(&plan, &response));

        match response {
            Ok(candidate) => {
                tracing::debug!(
                    end_stop = %candidate.end_stop_id,
                    total_time_s = candidate.total_time_s,
                    total_distance_m = candidate.total_distance_m,
                    "Candidate evaluated"
                );
                Some(candidate)
            }
            Err(err) => {
                tracing::warn!(end_stop = %plan.end_id, "Candidate excluded: {}", err);
                None
            }
        }
    }
}
