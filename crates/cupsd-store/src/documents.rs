// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Document repository, ordered by insertion (the `number` column).

use cupsd_core::error::Result;
use cupsd_core::Document;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::map_err;

fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        file_name: row.get("file_name")?,
        mime_type: row.get("mime_type")?,
        path: row.get("path")?,
        size_bytes: row.get("size_bytes")?,
        number: row.get("number")?,
    })
}

pub fn list_for_job(conn: &Connection, job_id: i64) -> Result<Vec<Document>> {
    let mut stmt = conn
        .prepare("SELECT * FROM documents WHERE job_id = ?1 ORDER BY number")
        .map_err(map_err)?;
    let rows = stmt
        .query_map(params![job_id], row_to_document)
        .map_err(map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_err)?;
    Ok(rows)
}

pub fn get(conn: &Connection, job_id: i64, number: i64) -> Result<Option<Document>> {
    conn.query_row(
        "SELECT * FROM documents WHERE job_id = ?1 AND number = ?2",
        params![job_id, number],
        row_to_document,
    )
    .optional()
    .map_err(map_err)
}

pub fn insert(conn: &Connection, job_id: i64, file_name: &str, mime_type: &str, path: &str, size_bytes: i64) -> Result<i64> {
    let next_number: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(number), 0) + 1 FROM documents WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )
        .map_err(map_err)?;
    conn.execute(
        "INSERT INTO documents (job_id, file_name, mime_type, path, size_bytes, number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![job_id, file_name, mime_type, path, size_bytes, next_number],
    )
    .map_err(map_err)?;
    Ok(conn.last_insert_rowid())
}
