// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Daemon configuration, loaded from a JSON file and overridable by a
// handful of environment variables (`CUPS_USER_GROUPS`, `CUPS_GEO_LOCATION`,
// `CUPS_ORGANIZATION`, `CUPS_ORGANIZATIONAL_UNIT`, `CUPS_LANG`/`LANG`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Persistent daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port the IPP/HTTP listener binds to.
    pub listen_port: u16,
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Directory spool files are written under, addressed by `(job-id, filename)`.
    pub spool_dir: String,
    /// Directory PPD files live under, addressed by sanitized filenames.
    pub ppd_dir: String,
    /// Default auth scheme when a location/limit does not name one explicitly.
    pub default_auth_type: String,
    /// Whether the DNS-SD advertiser is started.
    pub mdns_enabled: bool,
    /// `_share_printers`: whether printers are shared on the network by default.
    pub share_printers: bool,
    /// `_remote_admin`: whether admin operations are allowed from non-loopback clients.
    pub remote_admin: bool,
    /// `_remote_any`: whether any remote (non-loopback) request is allowed at all.
    pub remote_any: bool,
    /// `_user_cancel_any`: relaxes the ownership rule for Cancel-Job/Cancel-Jobs.
    pub user_cancel_any: bool,
    /// `_preserve_job_history`: keep terminal jobs in the store instead of pruning them.
    pub preserve_job_history: bool,
    /// `_preserve_job_files`: keep spool files after Purge-Jobs.
    pub preserve_job_files: bool,
    /// `_max_clients`.
    pub max_clients: u32,
    /// `_max_jobs`: 0 = unbounded.
    pub max_jobs: u32,
    /// `_debug_logging`.
    pub debug_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 631,
            db_path: "cupsd.db".to_string(),
            spool_dir: "/var/spool/cupsd".to_string(),
            ppd_dir: "/var/lib/cupsd/ppd".to_string(),
            default_auth_type: "basic".to_string(),
            mdns_enabled: true,
            share_printers: false,
            remote_admin: false,
            remote_any: false,
            user_cancel_any: false,
            preserve_job_history: true,
            preserve_job_files: false,
            max_clients: 100,
            max_jobs: 500,
            debug_logging: false,
        }
    }
}

impl Config {
    /// Load from a JSON config file (`serde_json` to/from a flat struct).
    /// A missing file yields the defaults; a present-but-unparseable file
    /// is an error. Environment overrides are consulted separately via
    /// [`EnvOverrides::from_env`].
    pub fn load(path: &str) -> crate::error::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &str) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Environment-supplied values that fill in request-time fallbacks rather
/// than daemon config: per-user group membership for the policy engine, and
/// banner/geo/org fallbacks used when a printer doesn't declare its own.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Parsed from `CUPS_USER_GROUPS="user=g1,g2;user2=g3"`.
    pub user_groups: HashMap<String, Vec<String>>,
    pub geo_location: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub lang: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            user_groups: std::env::var("CUPS_USER_GROUPS")
                .ok()
                .map(|s| parse_user_groups(&s))
                .unwrap_or_default(),
            geo_location: std::env::var("CUPS_GEO_LOCATION").ok(),
            organization: std::env::var("CUPS_ORGANIZATION").ok(),
            organizational_unit: std::env::var("CUPS_ORGANIZATIONAL_UNIT").ok(),
            lang: std::env::var("CUPS_LANG").or_else(|_| std::env::var("LANG")).ok(),
        }
    }

    pub fn groups_for(&self, user: &str) -> &[String] {
        self.user_groups
            .get(user)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Parses `user=g1,g2;user2=g3` into a per-user group map.
fn parse_user_groups(raw: &str) -> HashMap<String, Vec<String>> {
    let mut map = HashMap::new();
    for entry in raw.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some((user, groups)) = entry.split_once('=') {
            let groups = groups
                .split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect();
            map.insert(user.trim().to_string(), groups);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_groups() {
        let groups = parse_user_groups("alice=wheel,printops;bob=printops");
        assert_eq!(groups["alice"], vec!["wheel", "printops"]);
        assert_eq!(groups["bob"], vec!["printops"]);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let cfg = Config::load("/nonexistent/cupsd-config.json").unwrap();
        assert_eq!(cfg.listen_port, Config::default().listen_port);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cupsd.json");
        let path = path.to_str().unwrap();
        let mut cfg = Config::default();
        cfg.listen_port = 6310;
        cfg.share_printers = true;
        cfg.save(path).unwrap();
        let loaded = Config::load(path).unwrap();
        assert_eq!(loaded.listen_port, 6310);
        assert!(loaded.share_printers);
    }
}
