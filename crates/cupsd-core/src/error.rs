// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Unified error taxonomy for cupsd, spanning the codec, policy, dispatch and
// store crates. Every variant knows its own IPP status code (RFC 8011 §13.1)
// so handlers can propagate `?` and let the dispatcher encode the response
// without re-deriving the mapping at each call site.

use thiserror::Error;

/// Top-level error type shared by every cupsd crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed required attribute.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Referenced printer/class/job/subscription does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Auth absent or identity insufficient.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Policy denies (deny-all, IP rule, require-groups mismatch).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Destination has `accepting=false`.
    #[error("destination not accepting jobs: {0}")]
    NotAcceptingJobs(String),

    /// Capability or PPD-constraint violation.
    #[error("attribute or value not supported: {0}")]
    AttributesOrValuesNotSupported(String),

    /// document-format not in the supported set.
    #[error("document format not supported: {0}")]
    DocumentFormatNotSupported(String),

    /// Legal request against an incompatible state.
    #[error("not possible: {0}")]
    NotPossible(String),

    /// Database error, mapped to IPP internal error.
    #[error("database error: {0}")]
    Database(String),

    /// File I/O error, mapped to IPP internal error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error, mapped to IPP internal error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything unexpected; logged and mapped to server-error-internal-error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// RFC 8011 §13.1 status code this error maps to.
    pub fn ipp_status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 0x0400,
            Self::Forbidden(_) => 0x0401,
            Self::NotAuthorized(_) => 0x0403,
            Self::NotPossible(_) => 0x0404,
            Self::NotFound(_) => 0x0406,
            Self::DocumentFormatNotSupported(_) => 0x040a,
            Self::AttributesOrValuesNotSupported(_) => 0x040b,
            Self::NotAcceptingJobs(_) => 0x0506,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                0x0500
            }
        }
    }

    /// Whether this error should short-circuit before the dispatcher with a
    /// bare HTTP status (policy/auth failures) rather than an IPP response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::NotAuthorized(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;
