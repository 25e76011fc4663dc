//! Tour Server - route optimization and geofence notifications for property tours

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tour_clients::{DirectionsClient, NotifyClient};
use tour_core::{Contact, GeofenceDelivery, StopRepository, TourError, TriggerSource};
use tour_server::config::Config;
use tour_server::geofence::GeofenceProcessor;
use tour_server::persistence::{self, Database};
use tour_server::route_optimizer::{OptimizerConfig, RouteOptimizer};
use tour_server::state_cache::FileStateCache;
use tour_server::tours::TourLifecycle;

#[derive(Parser, Debug)]
#[command(name = "tour-server", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute and persist the best visiting order for a tour
    Optimize {
        #[arg(long)]
        tour_id: String,
    },
    /// Start a tour, snapshot its stops locally, print regions to monitor
    StartTour {
        #[arg(long)]
        tour_id: String,
        /// Signed-in user id, shown as the sender of notifications
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long, requires = "user_id")]
        user_name: Option<String>,
    },
    /// Mark a tour complete
    CompleteTour {
        #[arg(long)]
        tour_id: String,
    },
    /// Process newline-delimited geofence deliveries from stdin
    Geofence,
    /// Send the "next up" notification for a stop by hand
    NotifyNext {
        #[arg(long)]
        stop_id: String,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("tour_server=debug".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env();
    init_tracing(config.log_json)?;

    let db = persistence::init_database(&config.database_path, config.database_max_connections)
        .await
        .context("Failed to open tour database")?;

    let result = run(args.command, &config, &db).await;
    db.close().await;
    result
}

async fn run(command: Command, config: &Config, db: &Database) -> Result<()> {
    let repository = Arc::new(db.clone());
    let cache = Arc::new(FileStateCache::new(&config.state_cache_dir));

    match command {
        Command::Optimize { tour_id } => {
            let oracle = Arc::new(DirectionsClient::new(config.directions())?);
            let optimizer = RouteOptimizer::new(oracle, repository, OptimizerConfig::from(config));
            match optimizer.optimize_tour(&tour_id).await {
                Ok(route) => {
                    println!("{}", serde_json::to_string_pretty(&route)?);
                    Ok(())
                }
                Err(err) if err.is_retryable() => {
                    tracing::error!(tour_id = %tour_id, "Could not compute route: {}", err);
                    Err(anyhow::anyhow!("could not compute route, please try again: {}", err))
                }
                Err(err) => Err(err.into()),
            }
        }
        Command::StartTour {
            tour_id,
            user_id,
            user_name,
        } => {
            let lifecycle = TourLifecycle::new(repository, cache, config.geofence_radius_m);
            let user = user_id.map(|id| Contact {
                name: user_name.unwrap_or_else(|| id.clone()),
                id,
                phone: None,
                email: None,
            });
            let regions = lifecycle.start_tour(&tour_id, user.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&regions)?);
            Ok(())
        }
        Command::CompleteTour { tour_id } => {
            let lifecycle = TourLifecycle::new(repository, cache, config.geofence_radius_m);
            lifecycle.complete_tour(&tour_id).await?;
            Ok(())
        }
        Command::Geofence => {
            let dispatcher = Arc::new(NotifyClient::new(config.notify())?);
            let processor = GeofenceProcessor::new(repository, cache, dispatcher);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<GeofenceDelivery>(line) {
                    Ok(delivery) => {
                        let outcome = processor.handle(delivery).await;
                        tracing::info!(?outcome, "Geofence delivery handled");
                    }
                    Err(err) => {
                        tracing::warn!("Unreadable geofence delivery: {}", err);
                    }
                }
            }
            Ok(())
        }
        Command::NotifyNext { stop_id } => {
            let dispatcher = Arc::new(NotifyClient::new(config.notify())?);
            let processor = GeofenceProcessor::new(repository.clone(), cache, dispatcher);
            let stop = repository
                .get_stop(&stop_id)
                .await?
                .ok_or_else(|| TourError::integrity(format!("stop {} not found", stop_id)))?;
            let outcome = processor
                .notifier()
                .notify_next_on_tour(&stop, TriggerSource::Manual)
                .await;
            println!("{:?}", outcome);
            Ok(())
        }
    }
}
