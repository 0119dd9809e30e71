// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// User repository (the authenticator's backing store).

use cupsd_core::error::Result;
use cupsd_core::User;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::map_err;

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        digest_ha1: row.get("digest_ha1")?,
        is_admin: row.get::<_, i64>("is_admin")? != 0,
    })
}

pub fn find(conn: &Connection, username: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT * FROM users WHERE username = ?1",
        params![username],
        row_to_user,
    )
    .optional()
    .map_err(map_err)
}

pub fn upsert(conn: &Connection, u: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (username, password_hash, digest_ha1, is_admin) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(username) DO UPDATE SET
             password_hash = excluded.password_hash,
             digest_ha1 = excluded.digest_ha1,
             is_admin = excluded.is_admin",
        params![u.username, u.password_hash, u.digest_ha1, u.is_admin as i64],
    )
    .map_err(map_err)?;
    Ok(())
}

/// Populates `digest_ha1` for a user who authenticated with `Basic` but had
/// none on file yet (`MD5(username:"CUPS-Golang":password)`).
pub fn set_ha1(conn: &Connection, username: &str, ha1: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET digest_ha1 = ?2 WHERE username = ?1",
        params![username, ha1],
    )
    .map_err(map_err)?;
    Ok(())
}
