// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Subscription + notification repositories. Sequence numbers are kept
// dense and monotonic per subscription by `notifications::append` reading
// `MAX(sequence_number)` inside the caller's transaction.

use chrono::Utc;
use cupsd_core::error::Result;
use cupsd_core::{NotifyDelivery, Subscription, SubscriptionOwner};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::map_err;

fn row_to_subscription(row: &Row) -> rusqlite::Result<Subscription> {
    let printer_id: Option<i64> = row.get("printer_id")?;
    let job_id: Option<i64> = row.get("job_id")?;
    let owner = match (printer_id, job_id) {
        (Some(p), None) => SubscriptionOwner::Printer(p),
        (None, Some(j)) => SubscriptionOwner::Job(j),
        _ => unreachable!("CHECK constraint guarantees exactly one owner"),
    };
    let recipient_uri: Option<String> = row.get("recipient_uri")?;
    let pull_method: Option<String> = row.get("pull_method")?;
    let delivery = match (recipient_uri, pull_method) {
        (Some(uri), None) => NotifyDelivery::Push { recipient_uri: uri },
        (None, Some(method)) => NotifyDelivery::Pull { method },
        _ => unreachable!("CHECK constraint guarantees exactly one delivery mode"),
    };
    let events_raw: String = row.get("events")?;
    let events: Vec<String> = serde_json::from_str(&events_raw).unwrap_or_default();
    let created_at: String = row.get("created_at")?;
    Ok(Subscription {
        id: row.get("id")?,
        owner,
        events,
        lease_secs: row.get::<_, i64>("lease_secs")? as u32,
        delivery,
        time_interval: row.get::<_, i64>("time_interval")? as u32,
        user: row.get("user_name")?,
        user_data: row.get("user_data").unwrap_or_default(),
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Subscription> {
    conn.query_row("SELECT * FROM subscriptions WHERE id = ?1", params![id], row_to_subscription)
        .map_err(map_err)
}

pub fn find(conn: &Connection, id: i64) -> Result<Option<Subscription>> {
    conn.query_row("SELECT * FROM subscriptions WHERE id = ?1", params![id], row_to_subscription)
        .optional()
        .map_err(map_err)
}

pub fn list_for_user(conn: &Connection, user: &str) -> Result<Vec<Subscription>> {
    let mut stmt = conn
        .prepare("SELECT * FROM subscriptions WHERE user_name = ?1 ORDER BY id")
        .map_err(map_err)?;
    let rows = stmt
        .query_map(params![user], row_to_subscription)
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_err)?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare("SELECT * FROM subscriptions ORDER BY id").map_err(map_err)?;
    let rows = stmt
        .query_map([], row_to_subscription)
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_err)?;
    Ok(rows)
}

pub fn insert(conn: &Connection, s: &Subscription) -> Result<i64> {
    let (printer_id, job_id) = match s.owner {
        SubscriptionOwner::Printer(p) => (Some(p), None),
        SubscriptionOwner::Job(j) => (None, Some(j)),
    };
    let (recipient_uri, pull_method) = match &s.delivery {
        NotifyDelivery::Push { recipient_uri } => (Some(recipient_uri.as_str()), None),
        NotifyDelivery::Pull { method } => (None, Some(method.as_str())),
    };
    let events_json = serde_json::to_string(&s.events)?;
    conn.execute(
        "INSERT INTO subscriptions (printer_id, job_id, events, lease_secs, recipient_uri, pull_method, time_interval, user_name, user_data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            printer_id,
            job_id,
            events_json,
            s.lease_secs,
            recipient_uri,
            pull_method,
            s.time_interval,
            s.user,
            s.user_data,
            s.created_at.to_rfc3339(),
        ],
    )
    .map_err(map_err)?;
    Ok(conn.last_insert_rowid())
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![id])
        .map_err(map_err)?;
    Ok(())
}

/// Renews a printer-scoped subscription's lease. Job subscriptions are
/// non-renewable; callers must reject those before calling.
pub fn renew(conn: &Connection, id: i64, lease_secs: u32) -> Result<()> {
    conn.execute(
        "UPDATE subscriptions SET lease_secs = ?2 WHERE id = ?1",
        params![id, lease_secs],
    )
    .map_err(map_err)?;
    Ok(())
}
