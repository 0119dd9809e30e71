// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Notification repository. Sequence numbers are dense, monotonic per
// subscription and start at 1.

use chrono::Utc;
use cupsd_core::error::Result;
use cupsd_core::Notification;
use rusqlite::{params, Connection, Row};

use crate::error::map_err;

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let created_at: String = row.get("created_at")?;
    Ok(Notification {
        subscription_id: row.get("subscription_id")?,
        sequence_number: row.get("sequence_number")?,
        event: row.get("event")?,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

/// Appends an event, assigning the next dense sequence number for this
/// subscription. Must run inside the same transaction as the state change
/// that triggered the event so a crash never creates a gap.
pub fn append(conn: &Connection, subscription_id: i64, event: &str) -> Result<i64> {
    let next: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM notifications WHERE subscription_id = ?1",
            params![subscription_id],
            |r| r.get(0),
        )
        .map_err(map_err)?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO notifications (subscription_id, sequence_number, event, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![subscription_id, next, event, now],
    )
    .map_err(map_err)?;
    Ok(next)
}

/// All notifications for `subscription_id` with `sequence_number >= min_seq`,
/// ascending, bounded by `limit` (0 = unbounded).
pub fn list_since(conn: &Connection, subscription_id: i64, min_seq: i64, limit: u32) -> Result<Vec<Notification>> {
    let sql = if limit == 0 {
        "SELECT * FROM notifications WHERE subscription_id = ?1 AND sequence_number >= ?2 ORDER BY sequence_number".to_string()
    } else {
        format!(
            "SELECT * FROM notifications WHERE subscription_id = ?1 AND sequence_number >= ?2 ORDER BY sequence_number LIMIT {limit}"
        )
    };
    let mut stmt = conn.prepare(&sql).map_err(map_err)?;
    let rows = stmt
        .query_map(params![subscription_id, min_seq], row_to_notification)
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_err)?;
    Ok(rows)
}
