// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Settings repository: the free-form key/value map, including the
// per-destination ACL keys `printer.<id>.{allowed_users,denied_users}` and
// `class.<id>.…`.

use cupsd_core::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::map_err;

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |r| r.get(0))
        .optional()
        .map_err(map_err)
}

pub fn get_bool(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    Ok(get(conn, key)?
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default))
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .map_err(map_err)?;
    Ok(())
}

/// CSV-encoded user list for `printer.<id>.allowed_users` /
/// `class.<id>.denied_users` style keys.
pub fn get_user_list(conn: &Connection, key: &str) -> Result<Vec<String>> {
    Ok(get(conn, key)?
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default())
}

/// Deletes every `printer.<id>.*` / `class.<id>.*` key on destination
/// cascade-delete.
pub fn delete_prefixed(conn: &Connection, prefix: &str) -> Result<()> {
    let pattern = format!("{prefix}%");
    conn.execute("DELETE FROM settings WHERE key LIKE ?1", params![pattern])
        .map_err(map_err)?;
    Ok(())
}
