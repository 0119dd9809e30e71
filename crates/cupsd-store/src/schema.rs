// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// SQL schema. Migration *mechanics* are an external collaborator per
// this module
// only issues the `CREATE TABLE IF NOT EXISTS` statements the daemon needs
// to run against a fresh or already-migrated database.

use rusqlite::Connection;

use crate::error::map_err;

pub fn ensure_schema(conn: &Connection) -> cupsd_core::error::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS printers (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            name                TEXT NOT NULL UNIQUE,
            device_uri          TEXT NOT NULL,
            ppd_name            TEXT,
            info                TEXT NOT NULL DEFAULT '',
            location            TEXT NOT NULL DEFAULT '',
            geo                 TEXT NOT NULL DEFAULT '',
            org                 TEXT NOT NULL DEFAULT '',
            org_unit            TEXT NOT NULL DEFAULT '',
            state               INTEGER NOT NULL DEFAULT 3,
            accepting           INTEGER NOT NULL DEFAULT 1,
            shared              INTEGER NOT NULL DEFAULT 0,
            is_default          INTEGER NOT NULL DEFAULT 0,
            job_sheets_default  TEXT NOT NULL DEFAULT 'none,none',
            default_options     TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS classes (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            name                TEXT NOT NULL UNIQUE,
            info                TEXT NOT NULL DEFAULT '',
            location            TEXT NOT NULL DEFAULT '',
            geo                 TEXT NOT NULL DEFAULT '',
            org                 TEXT NOT NULL DEFAULT '',
            org_unit            TEXT NOT NULL DEFAULT '',
            state               INTEGER NOT NULL DEFAULT 3,
            accepting           INTEGER NOT NULL DEFAULT 1,
            shared              INTEGER NOT NULL DEFAULT 0,
            is_default          INTEGER NOT NULL DEFAULT 0,
            job_sheets_default  TEXT NOT NULL DEFAULT 'none,none',
            default_options     TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS class_members (
            class_id    INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
            printer_id  INTEGER NOT NULL REFERENCES printers(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            PRIMARY KEY (class_id, printer_id)
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            printer_id      INTEGER NOT NULL REFERENCES printers(id) ON DELETE CASCADE,
            name            TEXT NOT NULL DEFAULT '',
            user_name       TEXT NOT NULL,
            options         TEXT NOT NULL DEFAULT '{}',
            state           INTEGER NOT NULL,
            state_reason    TEXT NOT NULL DEFAULT 'none',
            submitted_at    TEXT NOT NULL,
            completed_at    TEXT,
            impressions     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS documents (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id      INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            file_name   TEXT NOT NULL,
            mime_type   TEXT NOT NULL,
            path        TEXT,
            size_bytes  INTEGER NOT NULL DEFAULT 0,
            number      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            printer_id          INTEGER REFERENCES printers(id) ON DELETE CASCADE,
            job_id              INTEGER REFERENCES jobs(id) ON DELETE CASCADE,
            events              TEXT NOT NULL DEFAULT '[]',
            lease_secs          INTEGER NOT NULL DEFAULT 0,
            recipient_uri       TEXT,
            pull_method         TEXT,
            time_interval       INTEGER NOT NULL DEFAULT 0,
            user_name           TEXT NOT NULL,
            user_data           BLOB,
            created_at          TEXT NOT NULL,
            CHECK ((printer_id IS NULL) != (job_id IS NULL)),
            CHECK ((recipient_uri IS NULL) != (pull_method IS NULL))
        );

        CREATE TABLE IF NOT EXISTS notifications (
            subscription_id     INTEGER NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
            sequence_number      INTEGER NOT NULL,
            event                TEXT NOT NULL,
            created_at           TEXT NOT NULL,
            PRIMARY KEY (subscription_id, sequence_number)
        );

        CREATE TABLE IF NOT EXISTS users (
            username        TEXT PRIMARY KEY,
            password_hash   TEXT NOT NULL DEFAULT '',
            digest_ha1      TEXT NOT NULL DEFAULT '',
            is_admin        INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS settings (
            key     TEXT PRIMARY KEY,
            value   TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_err)
}
