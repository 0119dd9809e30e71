// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Class repository: row <-> `cupsd_core::Class` mapping plus ordered member
// management (`class_members.position`).

use std::collections::HashMap;

use cupsd_core::error::Result;
use cupsd_core::{Class, DestinationCommon, PrinterState};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::map_err;

fn row_to_common(row: &Row) -> rusqlite::Result<DestinationCommon> {
    let job_sheets: String = row.get("job_sheets_default")?;
    let (start, end) = job_sheets.split_once(',').unwrap_or(("none", "none"));
    let default_options_raw: String = row.get("default_options")?;
    let default_options: HashMap<String, String> =
        serde_json::from_str(&default_options_raw).unwrap_or_default();
    let state: i32 = row.get("state")?;
    Ok(DestinationCommon {
        id: row.get("id")?,
        name: row.get("name")?,
        info: row.get("info")?,
        location: row.get("location")?,
        geo: row.get("geo")?,
        org: row.get("org")?,
        org_unit: row.get("org_unit")?,
        state: PrinterState::from_i32(state).unwrap_or(PrinterState::Idle),
        accepting: row.get::<_, i64>("accepting")? != 0,
        shared: row.get::<_, i64>("shared")? != 0,
        is_default: row.get::<_, i64>("is_default")? != 0,
        job_sheets_default: (start.to_string(), end.to_string()),
        default_options,
    })
}

fn members(conn: &Connection, class_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT printer_id FROM class_members WHERE class_id = ?1 ORDER BY position")
        .map_err(map_err)?;
    let rows = stmt
        .query_map(params![class_id], |r| r.get(0))
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<i64>>>()
        .map_err(map_err)?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: i64) -> Result<Class> {
    let common = conn
        .query_row("SELECT * FROM classes WHERE id = ?1", params![id], row_to_common)
        .map_err(map_err)?;
    let members = members(conn, id)?;
    Ok(Class { common, members })
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Class>> {
    let common = conn
        .query_row("SELECT * FROM classes WHERE name = ?1", params![name], row_to_common)
        .optional()
        .map_err(map_err)?;
    match common {
        Some(common) => Ok(Some(Class {
            members: members(conn, common.id)?,
            common,
        })),
        None => Ok(None),
    }
}

pub fn list(conn: &Connection) -> Result<Vec<Class>> {
    let mut stmt = conn.prepare("SELECT * FROM classes ORDER BY id").map_err(map_err)?;
    let commons = stmt
        .query_map([], row_to_common)
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_err)?;
    let mut out = Vec::with_capacity(commons.len());
    for common in commons {
        let id = common.id;
        out.push(Class {
            common,
            members: members(conn, id)?,
        });
    }
    Ok(out)
}

pub fn default_class(conn: &Connection) -> Result<Option<Class>> {
    let common = conn
        .query_row(
            "SELECT * FROM classes WHERE is_default = 1 ORDER BY id LIMIT 1",
            [],
            row_to_common,
        )
        .optional()
        .map_err(map_err)?;
    match common {
        Some(common) => Ok(Some(Class {
            members: members(conn, common.id)?,
            common,
        })),
        None => Ok(None),
    }
}

pub fn insert(conn: &Connection, name: &str, info: &str, location: &str, members: &[i64]) -> Result<i64> {
    conn.execute(
        "INSERT INTO classes (name, info, location) VALUES (?1, ?2, ?3)",
        params![name, info, location],
    )
    .map_err(map_err)?;
    let id = conn.last_insert_rowid();
    set_members(conn, id, members)?;
    Ok(id)
}

/// Replaces the ordered member list wholesale.
pub fn set_members(conn: &Connection, class_id: i64, members: &[i64]) -> Result<()> {
    conn.execute("DELETE FROM class_members WHERE class_id = ?1", params![class_id])
        .map_err(map_err)?;
    for (position, printer_id) in members.iter().enumerate() {
        conn.execute(
            "INSERT INTO class_members (class_id, printer_id, position) VALUES (?1, ?2, ?3)",
            params![class_id, printer_id, position as i64],
        )
        .map_err(map_err)?;
    }
    Ok(())
}

pub fn update_common(conn: &Connection, id: i64, c: &DestinationCommon) -> Result<()> {
    let options_json = serde_json::to_string(&c.default_options)?;
    let job_sheets = format!("{},{}", c.job_sheets_default.0, c.job_sheets_default.1);
    conn.execute(
        "UPDATE classes SET info=?2, location=?3, geo=?4, org=?5, org_unit=?6,
         state=?7, accepting=?8, shared=?9, job_sheets_default=?10, default_options=?11
         WHERE id=?1",
        params![
            id,
            c.info,
            c.location,
            c.geo,
            c.org,
            c.org_unit,
            c.state as i32,
            c.accepting as i64,
            c.shared as i64,
            job_sheets,
            options_json,
        ],
    )
    .map_err(map_err)?;
    Ok(())
}

/// Sets `is_default` on this class after clearing it everywhere else
/// (at most one default across printers+classes).
pub fn set_default(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("UPDATE printers SET is_default = 0", []).map_err(map_err)?;
    conn.execute("UPDATE classes SET is_default = 0", []).map_err(map_err)?;
    conn.execute("UPDATE classes SET is_default = 1 WHERE id = ?1", params![id])
        .map_err(map_err)?;
    Ok(())
}

/// Deletes the class row. Members are NOT deleted (they are referenced, not
/// owned) — only the `class_members` rows go via cascade.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM classes WHERE id = ?1", params![id]).map_err(map_err)?;
    Ok(())
}

pub fn set_all_accepting(conn: &Connection, accepting: bool) -> Result<()> {
    conn.execute("UPDATE classes SET accepting=?1", params![accepting as i64])
        .map_err(map_err)?;
    Ok(())
}

pub fn set_all_state(conn: &Connection, state: PrinterState) -> Result<()> {
    conn.execute("UPDATE classes SET state=?1", params![state as i32])
        .map_err(map_err)?;
    Ok(())
}
