// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// rusqlite::Error -> cupsd_core::Error, distinguishing "no rows" (a
// not-found the caller usually wants to surface as such) from genuine
// database failures.

use cupsd_core::error::Error;
use rusqlite::Error as SqlError;

pub fn map_err(e: SqlError) -> Error {
    match e {
        SqlError::QueryReturnedNoRows => Error::NotFound("no matching row".to_string()),
        other => Error::Database(other.to_string()),
    }
}
