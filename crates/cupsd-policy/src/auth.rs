// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The authenticator. Verifies `Basic`, `Digest`, and `Negotiate`
// credentials (or "try each" of all three), upgrading a user's digest HA1
// on first successful Basic auth. Built on the same rusqlite-backed-store
// + thiserror + tracing idiom as the rest of the workspace.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest as _, Md5};
use rand::RngCore;
use sha2::{Digest as _, Sha256};
use tracing::{debug, warn};

use cupsd_core::error::{Error, Result};
use cupsd_store::Store;

pub const REALM: &str = "CUPS-Golang";
const NONCE_MAX_AGE_SECS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    Basic,
    Digest,
    Negotiate,
    TryEach,
}

impl AuthScheme {
    /// Blank -> server default; `"default"` -> server default; `"none"`
    /// short-circuits successfully with an anonymous identity. Fallback
    /// default is `"basic"`.
    pub fn normalize(raw: &str, server_default: &str) -> Self {
        let raw = raw.trim();
        let resolved = if raw.is_empty() || raw.eq_ignore_ascii_case("default") {
            server_default
        } else {
            raw
        };
        match resolved.to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "digest" | "digestsession" => Self::Digest,
            "negotiate" => Self::Negotiate,
            "" => Self::Basic,
            "basic" => Self::Basic,
            _ => Self::TryEach,
        }
    }

    /// `auth-info-required` advertisement: derives from the resolved scheme.
    pub fn auth_info_required(&self) -> Vec<&'static str> {
        match self {
            Self::None => vec![],
            Self::Negotiate => vec!["negotiate"],
            _ => vec!["username", "password"],
        }
    }

    fn www_authenticate_headers(&self) -> Vec<String> {
        match self {
            Self::None => vec![],
            Self::Basic => vec![format!("Basic realm=\"{REALM}\"")],
            Self::Digest => vec![digest_challenge()],
            Self::Negotiate => vec!["Negotiate".to_string()],
            Self::TryEach => vec![format!("Basic realm=\"{REALM}\""), digest_challenge(), "Negotiate".to_string()],
        }
    }
}

fn digest_challenge() -> String {
    format!("Digest realm=\"{REALM}\", qop=\"auth\", nonce=\"{}\"", generate_nonce(&nonce_secret(), now_unix()))
}

/// An authenticated identity, or the anonymous identity from `auth-type =
/// none`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub is_admin: bool,
    pub anonymous: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self { username: String::new(), is_admin: false, anonymous: true }
    }
}

/// Context a caller supplies from the HTTP transport layer: the `scheme`
/// each request should be checked against, plus whatever trusted-proxy
/// signals are available for `Negotiate`.
pub struct AuthRequest<'a> {
    pub scheme: AuthScheme,
    pub authorization_header: Option<&'a str>,
    pub method: &'a str,
    pub request_uri: &'a str,
    pub is_loopback: bool,
    pub tls_client_cert_cn: Option<&'a str>,
    pub nonce_secret: &'a [u8],
}

/// Verifies the request's credentials against `scheme` ("try each" probes
/// all three in turn). Returns the resolved identity, or an error carrying
/// the `WWW-Authenticate` header set to send back on failure.
pub fn authenticate(store: &Store, req: &AuthRequest) -> std::result::Result<Identity, AuthFailure> {
    if req.scheme == AuthScheme::None {
        return Ok(Identity::anonymous());
    }

    let schemes_to_try = match req.scheme {
        AuthScheme::TryEach => vec![AuthScheme::Negotiate, AuthScheme::Digest, AuthScheme::Basic],
        other => vec![other],
    };

    for scheme in &schemes_to_try {
        let attempt = match scheme {
            AuthScheme::Negotiate => try_negotiate(req),
            AuthScheme::Digest => try_digest(store, req),
            AuthScheme::Basic => try_basic(store, req),
            _ => None,
        };
        if let Some(identity) = attempt {
            return Ok(identity);
        }
    }

    Err(AuthFailure {
        www_authenticate: req.scheme.www_authenticate_headers(),
    })
}

#[derive(Debug)]
pub struct AuthFailure {
    pub www_authenticate: Vec<String>,
}

fn try_negotiate(req: &AuthRequest) -> Option<Identity> {
    // Token-less identity: a TLS client-cert CN is authoritative regardless
    // of the connection's address; on loopback (a trusted local reverse
    // proxy) the identity still needs a CN or header to bind to, so a bare
    // loopback connection with neither is left unauthenticated here.
    let cn = req.tls_client_cert_cn?;
    Some(Identity {
        username: cn.to_string(),
        is_admin: false,
        anonymous: false,
    })
}

fn try_basic(store: &Store, req: &AuthRequest) -> Option<Identity> {
    let header = req.authorization_header?;
    let rest = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(rest.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;

    let user = store.read(|c| cupsd_store::users::find(c, username)).ok()??;
    let expected = sha256_hex(password.as_bytes());
    if user.password_hash.is_empty() || user.password_hash != expected {
        warn!(username, "basic auth failed");
        return None;
    }

    if user.digest_ha1.is_empty() {
        let ha1 = compute_ha1(username, password);
        let _ = store.write(|c| cupsd_store::users::set_ha1(c, username, &ha1));
    }

    debug!(username, "basic auth succeeded");
    Some(Identity {
        username: user.username,
        is_admin: user.is_admin,
        anonymous: false,
    })
}

fn try_digest(store: &Store, req: &AuthRequest) -> Option<Identity> {
    let header = req.authorization_header?;
    let rest = header.strip_prefix("Digest ")?;
    let fields = parse_quoted_comma_fields(rest);

    if let Some(realm) = fields.get("realm") {
        if realm != REALM {
            return None;
        }
    }

    let username = fields.get("username")?;
    let nonce = fields.get("nonce")?;
    let uri = fields.get("uri")?;
    let response = fields.get("response")?;

    if !validate_nonce(nonce, req.nonce_secret, now_unix(), NONCE_MAX_AGE_SECS) {
        return None;
    }

    let user = store.read(|c| cupsd_store::users::find(c, username)).ok()??;
    if user.digest_ha1.is_empty() {
        return None;
    }

    let ha2 = md5_hex(format!("{}:{}", req.method, uri).as_bytes());
    let expected = if let (Some(qop), Some(nc), Some(cnonce)) =
        (fields.get("qop"), fields.get("nc"), fields.get("cnonce"))
    {
        md5_hex(format!("{}:{}:{}:{}:{}:{}", user.digest_ha1, nonce, nc, cnonce, qop, ha2).as_bytes())
    } else {
        md5_hex(format!("{}:{}:{}", user.digest_ha1, nonce, ha2).as_bytes())
    };

    if &expected != response {
        warn!(username, "digest auth failed");
        return None;
    }

    debug!(username, "digest auth succeeded");
    Some(Identity {
        username: user.username,
        is_admin: user.is_admin,
        anonymous: false,
    })
}

/// A tolerant quoted-comma splitter for `Authorization: Digest ...` header
/// parameter lists: commas inside quoted values don't split fields.
fn parse_quoted_comma_fields(rest: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut chars = rest.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut parts = Vec::new();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        if c != ',' || in_quotes {
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    for part in parts {
        if let Some((key, value)) = part.trim().split_once('=') {
            let value = value.trim().trim_matches('"');
            fields.insert(key.trim().to_string(), value.to_string());
        }
    }
    fields
}

/// `HA1 = MD5(username:realm:password)`.
pub fn compute_ha1(username: &str, password: &str) -> String {
    md5_hex(format!("{username}:{REALM}:{password}").as_bytes())
}

fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Generates a process-wide random nonce secret (one-shot initialization;
/// callers should cache this rather than regenerate it per-request).
pub fn nonce_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `base64(timestamp:HEX(SHA-256(timestamp:HEX(secret))))`.
pub fn generate_nonce(secret: &[u8], timestamp: i64) -> String {
    let secret_hex = hex::encode(secret);
    let digest = sha256_hex(format!("{timestamp}:{secret_hex}").as_bytes());
    BASE64.encode(format!("{timestamp}:{digest}"))
}

/// Validates a nonce's signature and 10-minute expiry window.
pub fn validate_nonce(nonce: &str, secret: &[u8], now: i64, max_age_secs: i64) -> bool {
    let decoded = match BASE64.decode(nonce) {
        Ok(d) => d,
        Err(_) => return false,
    };
    let text = match String::from_utf8(decoded) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let Some((ts_str, digest)) = text.split_once(':') else {
        return false;
    };
    let Ok(timestamp) = ts_str.parse::<i64>() else {
        return false;
    };
    if now - timestamp > max_age_secs || timestamp > now {
        return false;
    }
    let secret_hex = hex::encode(secret);
    let expected = sha256_hex(format!("{ts_str}:{secret_hex}").as_bytes());
    expected == digest
}

/// Populates a user's digest HA1 and password hash for provisioning
/// accounts (e.g. from an admin UI, out of this crate's scope to build).
pub fn hash_password(password: &str) -> String {
    sha256_hex(password.as_bytes())
}

pub fn map_auth_failure(_failure: AuthFailure) -> Error {
    Error::NotAuthorized("authentication required".to_string())
}

pub fn map_auth_result<T>(result: std::result::Result<T, AuthFailure>) -> Result<T> {
    result.map_err(map_auth_failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_blank_and_default_resolve_to_server_default() {
        assert_eq!(AuthScheme::normalize("", "digest"), AuthScheme::Digest);
        assert_eq!(AuthScheme::normalize("Default", "basic"), AuthScheme::Basic);
    }

    #[test]
    fn normalize_none_short_circuits() {
        assert_eq!(AuthScheme::normalize("none", "digest"), AuthScheme::None);
    }

    #[test]
    fn auth_info_required_matches_scheme() {
        assert_eq!(AuthScheme::Negotiate.auth_info_required(), vec!["negotiate"]);
        assert_eq!(AuthScheme::Basic.auth_info_required(), vec!["username", "password"]);
        assert!(AuthScheme::None.auth_info_required().is_empty());
    }

    #[test]
    fn nonce_round_trips_within_expiry() {
        let secret = b"test-secret".to_vec();
        let nonce = generate_nonce(&secret, 1_000_000);
        assert!(validate_nonce(&nonce, &secret, 1_000_300, 600));
        assert!(!validate_nonce(&nonce, &secret, 1_000_700, 600));
    }

    #[test]
    fn nonce_rejects_wrong_secret() {
        let nonce = generate_nonce(b"secret-a", 1_000_000);
        assert!(!validate_nonce(&nonce, b"secret-b", 1_000_010, 600));
    }

    #[test]
    fn quoted_comma_splitter_handles_embedded_commas() {
        let header = r#"username="alice", realm="CUPS-Golang", nonce="abc,123", uri="/ipp/print", response="deadbeef""#;
        let fields = parse_quoted_comma_fields(header);
        assert_eq!(fields.get("username").unwrap(), "alice");
        assert_eq!(fields.get("nonce").unwrap(), "abc,123");
        assert_eq!(fields.get("uri").unwrap(), "/ipp/print");
    }

    #[test]
    fn ha1_matches_rfc2617_shape() {
        let ha1 = compute_ha1("alice", "hunter2");
        assert_eq!(ha1.len(), 32);
        assert_eq!(ha1, md5_hex(b"alice:CUPS-Golang:hunter2"));
    }

    #[test]
    fn basic_auth_succeeds_against_stored_hash_and_upgrades_ha1() {
        let store = Store::open_in_memory().unwrap();
        store
            .write(|c| {
                cupsd_store::users::upsert(
                    c,
                    &cupsd_core::User {
                        username: "alice".to_string(),
                        password_hash: hash_password("hunter2"),
                        digest_ha1: String::new(),
                        is_admin: false,
                    },
                )
            })
            .unwrap();

        let header = format!("Basic {}", BASE64.encode("alice:hunter2"));
        let req = AuthRequest {
            scheme: AuthScheme::Basic,
            authorization_header: Some(&header),
            method: "GET",
            request_uri: "/ipp/print",
            is_loopback: false,
            tls_client_cert_cn: None,
            nonce_secret: b"unused",
        };
        let identity = authenticate(&store, &req).unwrap();
        assert_eq!(identity.username, "alice");

        let user = store.read(|c| cupsd_store::users::find(c, "alice")).unwrap().unwrap();
        assert_eq!(user.digest_ha1, compute_ha1("alice", "hunter2"));
    }
}
