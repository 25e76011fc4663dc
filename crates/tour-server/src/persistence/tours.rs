//! Tour persistence operations.

use anyhow::Result;
use sqlx::SqlitePool;
use tour_core::{Tour, TourStatus};

/// Insert or replace a tour record.
pub async fn upsert_tour(pool: &SqlitePool, tour: &Tour) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tours (id, agent_id, client_name, status, current_stop_id, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            agent_id = ?2, client_name = ?3, status = ?4, current_stop_id = ?5,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&tour.id)
    .bind(&tour.agent_id)
    .bind(&tour.client_name)
    .bind(tour.status.as_str())
    .bind(&tour.current_stop_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_tour(pool: &SqlitePool, tour_id: &str) -> Result<Option<Tour>> {
    let row = sqlx::query_as::<_, TourRow>(
        "SELECT id, agent_id, client_name, status, current_stop_id FROM tours WHERE id = ?1",
    )
    .bind(tour_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => Ok(Some(r.try_into()?)),
        None => Ok(None),
    }
}

/// Returns false when the tour does not exist.
pub async fn set_tour_status(pool: &SqlitePool, tour_id: &str, status: TourStatus) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tours SET status = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
    )
    .bind(tour_id)
    .bind(status.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct TourRow {
    id: String,
    agent_id: String,
    client_name: String,
    status: String,
    current_stop_id: Option<String>,
}

impl TryFrom<TourRow> for Tour {
    type Error = anyhow::Error;

    fn try_from(row: TourRow) -> Result<Self> {
        let status = TourStatus::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("Unknown tour status {:?} for {}", row.status, row.id))?;

        Ok(Tour {
            id: row.id,
            agent_id: row.agent_id,
            client_name: row.client_name,
            status,
            current_stop_id: row.current_stop_id,
        })
    }
}
