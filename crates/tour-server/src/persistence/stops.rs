//! Tour stop persistence operations.

use anyhow::Result;
use sqlx::{Sqlite, SqlitePool};
use thiserror::Error;
use tour_core::{Contact, Coordinates, PropertyListing, StopFlagsUpdate, StopOrder, TourStop};

/// An order write that does not describe the tour's stops as `1..N`.
#[derive(Debug, Error)]
#[error("invalid stop ordering for tour {tour_id}: {reason}")]
pub struct InvalidOrdering {
    pub tour_id: String,
    pub reason: String,
}

const STOP_SELECT: &str = r#"
    SELECT
        s.id, s.tour_id, s.stop_order, s.address, s.lat, s.lon,
        s.notify_before, s.notify_after, s.notify_listing_agent, s.notify_seller,
        s.next_up_sent, s.next_up_sent_by, s.have_left_sent, s.have_left_sent_by,
        s.is_custom_listing,
        l.id AS listing_id, l.address AS listing_address,
        a.id AS agent_id, a.name AS agent_name, a.phone AS agent_phone, a.email AS agent_email,
        c.id AS seller_id, c.name AS seller_name, c.phone AS seller_phone, c.email AS seller_email
    FROM tour_stops s
    LEFT JOIN listings l ON l.id = s.listing_id
    LEFT JOIN contacts a ON a.id = l.listing_agent_id
    LEFT JOIN contacts c ON c.id = l.seller_id
"#;

pub async fn upsert_contact(pool: &SqlitePool, contact: &Contact) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contacts (id, name, phone, email)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET name = ?2, phone = ?3, email = ?4
        "#,
    )
    .bind(&contact.id)
    .bind(&contact.name)
    .bind(&contact.phone)
    .bind(&contact.email)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert a listing together with its agent and seller contacts.
pub async fn upsert_listing(pool: &SqlitePool, listing: &PropertyListing) -> Result<()> {
    if let Some(agent) = &listing.listing_agent {
        upsert_contact(pool, agent).await?;
    }
    if let Some(seller) = &listing.seller {
        upsert_contact(pool, seller).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO listings (id, address, listing_agent_id, seller_id)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET address = ?2, listing_agent_id = ?3, seller_id = ?4
        "#,
    )
    .bind(&listing.id)
    .bind(&listing.address)
    .bind(listing.listing_agent.as_ref().map(|c| c.id.as_str()))
    .bind(listing.seller.as_ref().map(|c| c.id.as_str()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert a stop (and its listing, if any).
pub async fn upsert_stop(pool: &SqlitePool, stop: &TourStop) -> Result<()> {
    if let Some(listing) = &stop.listing {
        upsert_listing(pool, listing).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO tour_stops (
            id, tour_id, listing_id, stop_order, address, lat, lon,
            notify_before, notify_after, notify_listing_agent, notify_seller,
            next_up_sent, next_up_sent_by, have_left_sent, have_left_sent_by,
            is_custom_listing, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            tour_id = ?2, listing_id = ?3, stop_order = ?4, address = ?5,
            lat = ?6, lon = ?7,
            notify_before = ?8, notify_after = ?9,
            notify_listing_agent = ?10, notify_seller = ?11,
            next_up_sent = MAX(next_up_sent, ?12),
            next_up_sent_by = COALESCE(next_up_sent_by, ?13),
            have_left_sent = MAX(have_left_sent, ?14),
            have_left_sent_by = COALESCE(have_left_sent_by, ?15),
            is_custom_listing = ?16,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&stop.id)
    .bind(&stop.tour_id)
    .bind(stop.listing.as_ref().map(|l| l.id.as_str()))
    .bind(stop.order)
    .bind(&stop.address)
    .bind(stop.location.lat)
    .bind(stop.location.lon)
    .bind(stop.notify_before)
    .bind(stop.notify_after)
    .bind(stop.notify_listing_agent)
    .bind(stop.notify_seller)
    .bind(stop.next_up_sent)
    .bind(&stop.next_up_sent_by)
    .bind(stop.have_left_sent)
    .bind(&stop.have_left_sent_by)
    .bind(stop.is_custom_listing)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a tour's stops sorted by `order`.
pub async fn load_tour_stops(pool: &SqlitePool, tour_id: &str) -> Result<Vec<TourStop>> {
    let query = format!("{} WHERE s.tour_id = ?1 ORDER BY s.stop_order ASC", STOP_SELECT);
    let rows = sqlx::query_as::<_, StopRow>(&query)
        .bind(tour_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(TourStop::from).collect())
}

pub async fn load_stop(pool: &SqlitePool, stop_id: &str) -> Result<Option<TourStop>> {
    let query = format!("{} WHERE s.id = ?1", STOP_SELECT);
    let row = sqlx::query_as::<_, StopRow>(&query)
        .bind(stop_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(TourStop::from))
}

/// Raise idempotency flags in one statement. Returns false if the stop is unknown.
///
/// Flags already set keep their original audit string.
pub async fn update_stop_flags(
    pool: &SqlitePool,
    stop_id: &str,
    update: &StopFlagsUpdate,
) -> Result<bool> {
    if update.is_empty() {
        return Ok(true);
    }

    let result = sqlx::query(
        r#"
        UPDATE tour_stops SET
            next_up_sent = CASE WHEN ?2 IS NOT NULL THEN 1 ELSE next_up_sent END,
            next_up_sent_by = CASE
                WHEN ?2 IS NOT NULL AND next_up_sent = 0 THEN ?2
                ELSE next_up_sent_by END,
            have_left_sent = CASE WHEN ?3 IS NOT NULL THEN 1 ELSE have_left_sent END,
            have_left_sent_by = CASE
                WHEN ?3 IS NOT NULL AND have_left_sent = 0 THEN ?3
                ELSE have_left_sent_by END,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?1
        "#,
    )
    .bind(stop_id)
    .bind(update.next_up_sent_by.map(|s| s.as_str()))
    .bind(update.have_left_sent_by.map(|s| s.as_str()))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn validate_orders(tour_id: &str, orders: &[StopOrder]) -> std::result::Result<(), InvalidOrdering> {
    let invalid = |reason: String| InvalidOrdering {
        tour_id: tour_id.to_string(),
        reason,
    };

    let mut seen = vec![false; orders.len()];
    for entry in orders {
        let slot = usize::try_from(entry.order - 1)
            .ok()
            .and_then(|idx| seen.get_mut(idx));
        match slot {
            Some(taken) if !*taken => *taken = true,
            _ => {
                return Err(invalid(format!(
                    "order {} for stop {} is not a unique value in 1..={}",
                    entry.order,
                    entry.stop_id,
                    orders.len()
                )))
            }
        }
    }
    Ok(())
}

/// Replace the ordering of every stop of a tour in a single transaction.
///
/// Orders are first parked on negative values so the `(tour_id, stop_order)`
/// unique index never sees a transient collision, then flipped positive.
/// Any failure rolls back and leaves the previous ordering intact.
pub async fn replace_stop_orders(
    pool: &SqlitePool,
    tour_id: &str,
    orders: &[StopOrder],
) -> Result<()> {
    validate_orders(tour_id, orders)?;

    let mut tx = pool.begin().await?;

    let (stop_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tour_stops WHERE tour_id = ?1")
            .bind(tour_id)
            .fetch_one(&mut *tx)
            .await?;
    if stop_count != orders.len() as i64 {
        tx.rollback().await.ok();
        return Err(InvalidOrdering {
            tour_id: tour_id.to_string(),
            reason: format!(
                "tour has {} stops but {} orders were supplied",
                stop_count,
                orders.len()
            ),
        }
        .into());
    }

    for entry in orders {
        if !park_stop_order(&mut tx, tour_id, entry).await? {
            tx.rollback().await.ok();
            return Err(InvalidOrdering {
                tour_id: tour_id.to_string(),
                reason: format!("stop {} does not belong to the tour", entry.stop_id),
            }
            .into());
        }
    }

    sqlx::query(
        r#"
        UPDATE tour_stops SET stop_order = -stop_order, updated_at = CURRENT_TIMESTAMP
        WHERE tour_id = ?1 AND stop_order < 0
        "#,
    )
    .bind(tour_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn park_stop_order(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    tour_id: &str,
    entry: &StopOrder,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE tour_stops SET stop_order = ?3 WHERE id = ?1 AND tour_id = ?2")
            .bind(&entry.stop_id)
            .bind(tour_id)
            .bind(-entry.order)
            .execute(&mut **tx)
            .await?;

    Ok(result.rows_affected() == 1)
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct StopRow {
    id: String,
    tour_id: String,
    stop_order: i64,
    address: String,
    lat: f64,
    lon: f64,
    notify_before: bool,
    notify_after: bool,
    notify_listing_agent: bool,
    notify_seller: bool,
    next_up_sent: bool,
    next_up_sent_by: Option<String>,
    have_left_sent: bool,
    have_left_sent_by: Option<String>,
    is_custom_listing: bool,
    listing_id: Option<String>,
    listing_address: Option<String>,
    agent_id: Option<String>,
    agent_name: Option<String>,
    agent_phone: Option<String>,
    agent_email: Option<String>,
    seller_id: Option<String>,
    seller_name: Option<String>,
    seller_phone: Option<String>,
    seller_email: Option<String>,
}

fn contact_from(
    id: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
) -> Option<Contact> {
    id.map(|id| Contact {
        name: name.unwrap_or_default(),
        id,
        phone,
        email,
    })
}

impl From<StopRow> for TourStop {
    fn from(row: StopRow) -> Self {
        let listing = row.listing_id.map(|id| PropertyListing {
            id,
            address: row.listing_address.unwrap_or_else(|| row.address.clone()),
            listing_agent: contact_from(
                row.agent_id,
                row.agent_name,
                row.agent_phone,
                row.agent_email,
            ),
            seller: contact_from(
                row.seller_id,
                row.seller_name,
                row.seller_phone,
                row.seller_email,
            ),
        });

        TourStop {
            id: row.id,
            tour_id: row.tour_id,
            order: row.stop_order,
            address: row.address,
            location: Coordinates::new(row.lat, row.lon),
            listing,
            notify_before: row.notify_before,
            notify_after: row.notify_after,
            notify_listing_agent: row.notify_listing_agent,
            notify_seller: row.notify_seller,
            next_up_sent: row.next_up_sent,
            next_up_sent_by: row.next_up_sent_by,
            have_left_sent: row.have_left_sent,
            have_left_sent_by: row.have_left_sent_by,
            is_custom_listing: row.is_custom_listing,
        }
    }
}
