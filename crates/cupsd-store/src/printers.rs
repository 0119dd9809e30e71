// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Printer repository: row <-> `cupsd_core::Printer` mapping and the queries
// the destination resolver and job state machine need. Functions take a
// `&Connection` (or an open `Transaction`, which derefs to `Connection`) so
// callers compose multi-table operations (e.g. cascading deletes) inside a
// single transaction.

use std::collections::HashMap;

use cupsd_core::error::Result;
use cupsd_core::{DestinationCommon, Printer, PrinterState};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::map_err;

fn row_to_printer(row: &Row) -> rusqlite::Result<Printer> {
    let job_sheets: String = row.get("job_sheets_default")?;
    let (start, end) = job_sheets.split_once(',').unwrap_or(("none", "none"));
    let default_options_raw: String = row.get("default_options")?;
    let default_options: HashMap<String, String> =
        serde_json::from_str(&default_options_raw).unwrap_or_default();
    let state: i32 = row.get("state")?;
    Ok(Printer {
        common: DestinationCommon {
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
        },
        device_uri: row.get("device_uri")?,
        ppd_name: row.get("ppd_name")?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Printer> {
    conn.query_row("SELECT * FROM printers WHERE id = ?1", params![id], row_to_printer)
        .map_err(map_err)
}

pub fn get_by_name(conn: &Connection, name: &str) -> Result<Printer> {
    conn.query_row(
        "SELECT * FROM printers WHERE name = ?1",
        params![name],
        row_to_printer,
    )
    .map_err(map_err)
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Printer>> {
    conn.query_row(
        "SELECT * FROM printers WHERE name = ?1",
        params![name],
        row_to_printer,
    )
    .optional()
    .map_err(map_err)
}

pub fn list(conn: &Connection) -> Result<Vec<Printer>> {
    let mut stmt = conn.prepare("SELECT * FROM printers ORDER BY id").map_err(map_err)?;
    let rows = stmt
        .query_map([], row_to_printer)
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_err)?;
    Ok(rows)
}

/// The server default destination: the row marked `is_default=1`, ties
/// broken printer-first, else the lowest-id printer.
pub fn default_printer(conn: &Connection) -> Result<Option<Printer>> {
    conn.query_row(
        "SELECT * FROM printers WHERE is_default = 1 ORDER BY id LIMIT 1",
        [],
        row_to_printer,
    )
    .optional()
    .map_err(map_err)
}

pub fn lowest_id(conn: &Connection) -> Result<Option<Printer>> {
    conn.query_row("SELECT * FROM printers ORDER BY id LIMIT 1", [], row_to_printer)
        .optional()
        .map_err(map_err)
}

pub struct NewPrinter<'a> {
    pub name: &'a str,
    pub device_uri: &'a str,
    pub ppd_name: Option<&'a str>,
    pub info: &'a str,
    pub location: &'a str,
    pub geo: &'a str,
    pub org: &'a str,
    pub org_unit: &'a str,
    pub shared: bool,
    pub default_options: &'a HashMap<String, String>,
}

pub fn insert(conn: &Connection, p: &NewPrinter) -> Result<i64> {
    let options_json = serde_json::to_string(p.default_options)?;
    conn.execute(
        "INSERT INTO printers (name, device_uri, ppd_name, info, location, geo, org, org_unit, shared, default_options)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            p.name,
            p.device_uri,
            p.ppd_name,
            p.info,
            p.location,
            p.geo,
            p.org,
            p.org_unit,
            p.shared as i64,
            options_json,
        ],
    )
    .map_err(map_err)?;
    Ok(conn.last_insert_rowid())
}

pub fn update_common(conn: &Connection, id: i64, c: &DestinationCommon) -> Result<()> {
    let options_json = serde_json::to_string(&c.default_options)?;
    let job_sheets = format!("{},{}", c.job_sheets_default.0, c.job_sheets_default.1);
    conn.execute(
        "UPDATE printers SET info=?2, location=?3, geo=?4, org=?5, org_unit=?6,
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

pub fn set_accepting(conn: &Connection, id: i64, accepting: bool) -> Result<()> {
    conn.execute(
        "UPDATE printers SET accepting=?2 WHERE id=?1",
        params![id, accepting as i64],
    )
    .map_err(map_err)?;
    Ok(())
}

pub fn set_state(conn: &Connection, id: i64, state: PrinterState) -> Result<()> {
    conn.execute("UPDATE printers SET state=?2 WHERE id=?1", params![id, state as i32])
        .map_err(map_err)?;
    Ok(())
}

/// Clears `is_default` across printers and classes, then sets it on this
/// printer (at most one default across printers+classes).
pub fn set_default(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("UPDATE printers SET is_default = 0", []).map_err(map_err)?;
    conn.execute("UPDATE classes SET is_default = 0", []).map_err(map_err)?;
    conn.execute("UPDATE printers SET is_default = 1 WHERE id = ?1", params![id])
        .map_err(map_err)?;
    Ok(())
}

/// Deletes the printer row. Cascading deletes of jobs/documents/subscriptions
/// are handled by `ON DELETE CASCADE`; per-destination settings keys
/// (`printer.<id>.*`) are cleaned up separately by the caller via
/// `settings::delete_prefixed`.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM printers WHERE id = ?1", params![id]).map_err(map_err)?;
    Ok(())
}

pub fn set_all_accepting(conn: &Connection, accepting: bool) -> Result<()> {
    conn.execute("UPDATE printers SET accepting=?1", params![accepting as i64])
        .map_err(map_err)?;
    Ok(())
}

pub fn set_all_state(conn: &Connection, state: PrinterState) -> Result<()> {
    conn.execute("UPDATE printers SET state=?1", params![state as i32])
        .map_err(map_err)?;
    Ok(())
}
