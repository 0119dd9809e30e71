// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Job repository. All state transitions go through `set_state`, which keeps
// the `state >= 7 <=> completed_at != nil` rule by construction.

use std::collections::HashMap;

use chrono::Utc;
use cupsd_core::error::Result;
use cupsd_core::{Job, JobState};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::map_err;

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    let options_raw: String = row.get("options")?;
    let options: HashMap<String, String> = serde_json::from_str(&options_raw).unwrap_or_default();
    let state: i32 = row.get("state")?;
    let submitted_at: String = row.get("submitted_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    Ok(Job {
        id: row.get("id")?,
        printer_id: row.get("printer_id")?,
        name: row.get("name")?,
        user_name: row.get("user_name")?,
        options,
        state: JobState::from_i32(state).unwrap_or(JobState::Pending),
        state_reason: row.get("state_reason")?,
        submitted_at: submitted_at.parse().unwrap_or_else(|_| Utc::now()),
        completed_at: completed_at.and_then(|s| s.parse().ok()),
        impressions: row.get("impressions")?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Job> {
    conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![id], row_to_job)
        .map_err(map_err)
}

pub fn find(conn: &Connection, id: i64) -> Result<Option<Job>> {
    conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![id], row_to_job)
        .optional()
        .map_err(map_err)
}

pub fn list_for_printer(conn: &Connection, printer_id: i64) -> Result<Vec<Job>> {
    query_list(conn, "SELECT * FROM jobs WHERE printer_id = ?1 ORDER BY id", params![printer_id])
}

pub fn list_for_user(conn: &Connection, user: &str) -> Result<Vec<Job>> {
    query_list(conn, "SELECT * FROM jobs WHERE user_name = ?1 ORDER BY id", params![user])
}

pub fn list_all(conn: &Connection) -> Result<Vec<Job>> {
    query_list(conn, "SELECT * FROM jobs ORDER BY id", [])
}

fn query_list<P: rusqlite::Params>(conn: &Connection, sql: &str, p: P) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(sql).map_err(map_err)?;
    let rows = stmt
        .query_map(p, row_to_job)
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_err)?;
    Ok(rows)
}

pub struct NewJob<'a> {
    pub printer_id: i64,
    pub name: &'a str,
    pub user_name: &'a str,
    pub options: &'a HashMap<String, String>,
    pub state: JobState,
    pub state_reason: &'a str,
}

pub fn insert(conn: &Connection, j: &NewJob) -> Result<i64> {
    let options_json = serde_json::to_string(j.options)?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO jobs (printer_id, name, user_name, options, state, state_reason, submitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![j.printer_id, j.name, j.user_name, options_json, j.state as i32, j.state_reason, now],
    )
    .map_err(map_err)?;
    Ok(conn.last_insert_rowid())
}

/// Transitions a job's state. Keeps `completed_at` set
/// exactly when the new state is terminal (>=7), cleared otherwise.
pub fn set_state(conn: &Connection, id: i64, state: JobState, reason: &str) -> Result<()> {
    let completed_at = if state.is_terminal() {
        Some(Utc::now().to_rfc3339())
    } else {
        None
    };
    conn.execute(
        "UPDATE jobs SET state=?2, state_reason=?3, completed_at=?4 WHERE id=?1",
        params![id, state as i32, reason, completed_at],
    )
    .map_err(map_err)?;
    Ok(())
}

pub fn set_options(conn: &Connection, id: i64, options: &HashMap<String, String>) -> Result<()> {
    let options_json = serde_json::to_string(options)?;
    conn.execute("UPDATE jobs SET options=?2 WHERE id=?1", params![id, options_json])
        .map_err(map_err)?;
    Ok(())
}

/// `CUPS-Move-Job`: rewrites the exclusive printer reference.
pub fn set_printer(conn: &Connection, id: i64, printer_id: i64) -> Result<()> {
    conn.execute("UPDATE jobs SET printer_id=?2 WHERE id=?1", params![id, printer_id])
        .map_err(map_err)?;
    Ok(())
}

pub fn set_impressions(conn: &Connection, id: i64, impressions: i64) -> Result<()> {
    conn.execute("UPDATE jobs SET impressions=?2 WHERE id=?1", params![id, impressions])
        .map_err(map_err)?;
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM jobs WHERE id = ?1", params![id]).map_err(map_err)?;
    Ok(())
}

pub fn delete_for_printer(conn: &Connection, printer_id: i64) -> Result<Vec<i64>> {
    let jobs = list_for_printer(conn, printer_id)?;
    conn.execute("DELETE FROM jobs WHERE printer_id = ?1", params![printer_id])
        .map_err(map_err)?;
    Ok(jobs.into_iter().map(|j| j.id).collect())
}
