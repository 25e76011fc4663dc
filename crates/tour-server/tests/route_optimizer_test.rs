//! Route optimizer tests against a scripted directions service.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{stop, tour, FakeRepository, Scripted, ScriptedOracle};
use tour_core::{StopRepository, TourError, TourStatus, TourStop};
use tour_server::backoff::RetryPolicy;
use tour_server::persistence::{init_database, stops as stops_db, tours as tours_db};
use tour_server::route_optimizer::{OptimizerConfig, RouteOptimizer};

fn fast_config() -> OptimizerConfig {
    OptimizerConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(2),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        max_concurrency: 4,
    }
}

fn four_stops() -> Vec<TourStop> {
    vec![stop("a", 1), stop("b", 2), stop("c", 3), stop("d", 4)]
}

fn optimizer(oracle: Arc<ScriptedOracle>, repo: Arc<FakeRepository>) -> RouteOptimizer {
    RouteOptimizer::new(oracle, repo, fast_config())
}

#[tokio::test]
async fn route_starts_at_start_and_visits_every_stop_once() {
    let stops = four_stops();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(&stops[1], Scripted::Route { time_s: 900, distance_m: 9_000, order: Some(vec![1, 0]) })
            .script(&stops[2], Scripted::Route { time_s: 700, distance_m: 8_000, order: Some(vec![1, 0]) })
            .script(&stops[3], Scripted::Route { time_s: 800, distance_m: 6_000, order: None }),
    );
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let route = optimizer(oracle.clone(), repo.clone())
        .optimize_tour("tour-1")
        .await
        .unwrap();

    // Candidate ending at "c" wins on time; its waypoints [b, d] come back reversed.
    assert_eq!(route.stop_order, vec!["a", "d", "b", "c"]);
    assert_eq!(route.total_time_s, 700);
    assert_eq!(route.candidates_evaluated, 3);
    assert_eq!(route.candidates_failed, 0);
    assert_eq!(oracle.calls(), 3);

    let unique: HashSet<&String> = route.stop_order.iter().collect();
    assert_eq!(unique.len(), stops.len());

    let persisted = repo.load_tour_stops("tour-1").await.unwrap();
    let ids: Vec<&str> = persisted.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "d", "b", "c"]);
    let orders: Vec<i64> = persisted.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);
    assert_eq!(repo.order_writes(), 1);
}

#[tokio::test]
async fn equal_time_prefers_shorter_distance() {
    let stops = vec![stop("a", 1), stop("b", 2), stop("c", 3)];
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(&stops[1], Scripted::Route { time_s: 600, distance_m: 5_200, order: None })
            .script(&stops[2], Scripted::Route { time_s: 600, distance_m: 4_100, order: None }),
    );
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let route = optimizer(oracle, repo).optimize(&stops).await.unwrap();

    assert_eq!(route.stop_order, vec!["a", "b", "c"]);
    assert_eq!(route.total_distance_m, 4_100);
}

#[tokio::test]
async fn all_candidates_failing_is_integrity_error_without_write() {
    let stops = four_stops();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(&stops[1], Scripted::Fail)
            .script(&stops[2], Scripted::Fail)
            .script(&stops[3], Scripted::Fail),
    );
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let err = optimizer(oracle.clone(), repo.clone())
        .optimize_tour("tour-1")
        .await
        .unwrap_err();

    assert!(matches!(err, TourError::DataIntegrity(_)));
    assert!(err.is_retryable());
    assert_eq!(repo.order_writes(), 0);
    // Three candidates, three attempts each.
    assert_eq!(oracle.calls(), 9);
}

#[tokio::test]
async fn failed_candidate_is_excluded_not_fatal() {
    let stops = four_stops();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(&stops[1], Scripted::Route { time_s: 100, distance_m: 100, order: None })
            .script(&stops[2], Scripted::Fail)
            .script(&stops[3], Scripted::Route { time_s: 500, distance_m: 500, order: None }),
    );
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let route = optimizer(oracle, repo).optimize(&stops).await.unwrap();

    assert_eq!(route.stop_order.last().map(String::as_str), Some("b"));
    assert_eq!(route.candidates_failed, 1);
}

#[tokio::test]
async fn malformed_waypoint_order_excludes_candidate() {
    let stops = four_stops();
    let oracle = Arc::new(
        ScriptedOracle::new()
            // Cheapest, but drops a waypoint.
            .script(&stops[1], Scripted::Route { time_s: 1, distance_m: 1, order: Some(vec![0]) })
            .script(&stops[2], Scripted::Route { time_s: 300, distance_m: 300, order: None })
            .script(&stops[3], Scripted::Route { time_s: 400, distance_m: 400, order: None }),
    );
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let route = optimizer(oracle, repo).optimize(&stops).await.unwrap();

    assert_eq!(route.stop_order, vec!["a", "b", "d", "c"]);
    assert_eq!(route.candidates_failed, 1);
}

#[tokio::test]
async fn truncated_directions_cannot_win() {
    let stops = vec![stop("a", 1), stop("b", 2), stop("c", 3)];
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(&stops[1], Scripted::Route { time_s: 200, distance_m: 900, order: None })
            .script(&stops[2], Scripted::Truncated { time_s: 10 }),
    );
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let route = optimizer(oracle, repo).optimize(&stops).await.unwrap();

    assert_eq!(route.stop_order, vec!["a", "c", "b"]);
    assert_eq!(route.total_time_s, 200);
    assert_eq!(route.candidates_failed, 1);
}

#[tokio::test]
async fn transient_oracle_failure_is_retried() {
    let stops = vec![stop("a", 1), stop("b", 2)];
    let oracle = Arc::new(ScriptedOracle::new().script(
        &stops[1],
        Scripted::FlakyThenRoute { failures: 2, time_s: 240, distance_m: 1_800 },
    ));
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let route = optimizer(oracle.clone(), repo).optimize(&stops).await.unwrap();

    assert_eq!(route.stop_order, vec!["a", "b"]);
    assert_eq!(route.total_time_s, 240);
    assert_eq!(oracle.calls(), 3);
}

#[tokio::test]
async fn single_stop_needs_no_directions() {
    let stops = vec![stop("only", 4)];
    let oracle = Arc::new(ScriptedOracle::new());
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));

    let route = optimizer(oracle.clone(), repo.clone())
        .optimize_tour("tour-1")
        .await
        .unwrap();

    assert_eq!(route.stop_order, vec!["only"]);
    assert_eq!(oracle.calls(), 0);
    assert_eq!(repo.stop("only").order, 1);
}

#[tokio::test]
async fn persistence_failure_is_reported() {
    let stops = vec![stop("a", 1), stop("b", 2)];
    let oracle = Arc::new(
        ScriptedOracle::new().script(&stops[1], Scripted::Route { time_s: 60, distance_m: 60, order: None }),
    );
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::NotStarted), &stops));
    *repo.fail_orders.lock().unwrap() = true;

    let err = optimizer(oracle, repo).optimize_tour("tour-1").await.unwrap_err();
    assert!(matches!(err, TourError::Persistence(_)));
}

#[tokio::test]
async fn completed_tour_is_not_reordered() {
    let stops = vec![stop("a", 1), stop("b", 2)];
    let oracle = Arc::new(ScriptedOracle::new());
    let repo = Arc::new(FakeRepository::new(tour(TourStatus::Complete), &stops));

    let err = optimizer(oracle.clone(), repo.clone())
        .optimize_tour("tour-1")
        .await
        .unwrap_err();

    assert!(matches!(err, TourError::DataIntegrity(_)));
    assert_eq!(oracle.calls(), 0);
    assert_eq!(repo.order_writes(), 0);
}

#[tokio::test]
async fn optimized_order_is_written_to_sqlite() {
    let db = Arc::new(init_database(":memory:", 1).await.unwrap());
    tours_db::upsert_tour(db.pool(), &tour(TourStatus::NotStarted))
        .await
        .unwrap();
    let stops = four_stops();
    for stop in &stops {
        stops_db::upsert_stop(db.pool(), stop).await.unwrap();
    }

    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(&stops[1], Scripted::Route { time_s: 50, distance_m: 50, order: Some(vec![1, 0]) })
            .script(&stops[2], Scripted::Route { time_s: 90, distance_m: 90, order: None })
            .script(&stops[3], Scripted::Route { time_s: 90, distance_m: 80, order: None }),
    );
    let optimizer = RouteOptimizer::new(oracle, db.clone(), fast_config());

    let route = optimizer.optimize_tour("tour-1").await.unwrap();
    assert_eq!(route.stop_order, vec!["a", "d", "c", "b"]);

    let persisted = stops_db::load_tour_stops(db.pool(), "tour-1").await.unwrap();
    let ids: Vec<&str> = persisted.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "d", "c", "b"]);
}
