// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Central service layer — initialises every backend subsystem once at
// startup and hands out a single `Arc<AppState>` the HTTP layer clones into
// each connection task. The `init()`-opens-every-store-and-logs-rather-
// than-aborts shape is carried over from a desktop app's bootstrap routine,
// adapted from UI-facing service handles to a daemon's request-scoped
// dispatch context.

use std::sync::Mutex;

use cupsd_core::config::EnvOverrides;
use cupsd_core::error::Result;
use cupsd_core::{Destination, User};
use cupsd_core::Config;
use cupsd_discovery::PrinterAdvertiser;
use cupsd_policy::PolicyEngine;
use cupsd_policy::auth;
use cupsd_store::Store;
use tracing::{info, warn};

use crate::services::data_dir;

/// Every subsystem a connection handler needs: the persistent store, the
/// resolved configuration, the access-control policy, environment-supplied
/// fallbacks, and the process-wide Digest nonce secret (generated once;
/// readers observe the final value via a happens-before from their
/// initialization).
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub policy: PolicyEngine,
    pub env: EnvOverrides,
    pub nonce_secret: Vec<u8>,
    advertiser: Mutex<Option<PrinterAdvertiser>>,
}

impl AppState {
    /// Loads config + policy from the data directory (or the paths named by
    /// `CUPSD_CONFIG`/`CUPSD_POLICY`), opens the SQLite store, ensures the
    /// spool/PPD directories exist, and seeds an initial admin account from
    /// `CUPSD_ADMIN_PASSWORD` when the user table is empty.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        info!(path = %dir.display(), "initialising cupsd services");

        let config_path = std::env::var("CUPSD_CONFIG")
            .unwrap_or_else(|_| dir.join("cupsd.json").to_string_lossy().into_owned());
        let policy_path = std::env::var("CUPSD_POLICY")
            .unwrap_or_else(|_| dir.join("policy.json").to_string_lossy().into_owned());

        let mut config = Config::load(&config_path)?;
        if config.db_path == Config::default().db_path {
            config.db_path = dir.join("cupsd.db").to_string_lossy().into_owned();
        }
        if config.spool_dir == Config::default().spool_dir {
            config.spool_dir = data_dir::data_subdir("spool").to_string_lossy().into_owned();
        }
        if config.ppd_dir == Config::default().ppd_dir {
            config.ppd_dir = data_dir::data_subdir("ppd").to_string_lossy().into_owned();
        }
        std::fs::create_dir_all(&config.spool_dir)?;
        std::fs::create_dir_all(&config.ppd_dir)?;
        config.save(&config_path)?;

        let policy = PolicyEngine::load(&policy_path)?;
        policy.save(&policy_path)?;

        let store = Store::open(&config.db_path)?;
        bootstrap_admin(&store)?;

        let env = EnvOverrides::from_env();
        let nonce_secret = auth::nonce_secret();

        info!(port = config.listen_port, mdns = config.mdns_enabled, "cupsd services initialised");

        Ok(Self {
            store,
            config,
            policy,
            env,
            nonce_secret,
            advertiser: Mutex::new(None),
        })
    }

    /// Starts the DNS-SD advertiser. A failure here (e.g. no multicast
    /// available in a sandboxed environment) is logged and otherwise
    /// ignored — discovery is best-effort, printing over a known URI still
    /// works without it.
    pub fn start_discovery(&self) {
        if !self.config.mdns_enabled {
            return;
        }
        match PrinterAdvertiser::new() {
            Ok(advertiser) => {
                *self.advertiser.lock().expect("advertiser lock poisoned") = Some(advertiser);
                self.sync_discovery();
            }
            Err(e) => warn!(error = %e, "mDNS advertiser unavailable"),
        }
    }

    /// Reconciles the advertised service set with the current printers and
    /// classes. Called after every mutating IPP request that could change
    /// what's shared (add/modify/delete printer or class, accept/reject).
    pub fn sync_discovery(&self) {
        let guard = self.advertiser.lock().expect("advertiser lock poisoned");
        let Some(advertiser) = guard.as_ref() else { return };
        let destinations = match self.all_destinations() {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "failed to list destinations for mDNS sync");
                return;
            }
        };
        if let Err(e) = advertiser.sync(&destinations, self.config.listen_port) {
            warn!(error = %e, "mDNS sync failed");
        }
    }

    fn all_destinations(&self) -> Result<Vec<Destination>> {
        self.store.read(|c| {
            let mut dests: Vec<Destination> =
                cupsd_store::printers::list(c)?.into_iter().map(Destination::Printer).collect();
            dests.extend(cupsd_store::classes::list(c)?.into_iter().map(Destination::Class));
            Ok(dests)
        })
    }
}

/// Seeds an initial admin account from `CUPSD_ADMIN_PASSWORD` the first
/// time the daemon starts against an empty user table; a deployment with no
/// users configured otherwise has no way to reach `/admin` at all.
fn bootstrap_admin(store: &Store) -> Result<()> {
    let has_users = store.read(|c| cupsd_store::users::find(c, "root"))?.is_some();
    if has_users {
        return Ok(());
    }
    let Ok(password) = std::env::var("CUPSD_ADMIN_PASSWORD") else {
        return Ok(());
    };
    store.write(|c| {
        cupsd_store::users::upsert(
            c,
            &User {
                username: "root".to_string(),
                password_hash: auth::hash_password(&password),
                digest_ha1: auth::compute_ha1("root", &password),
                is_admin: true,
            },
        )
    })?;
    info!("bootstrapped initial admin account 'root' from CUPSD_ADMIN_PASSWORD");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_admin_is_idempotent_and_respects_missing_env() {
        let store = Store::open_in_memory().unwrap();
        std::env::remove_var("CUPSD_ADMIN_PASSWORD");
        bootstrap_admin(&store).unwrap();
        assert!(store.read(|c| cupsd_store::users::find(c, "root")).unwrap().is_none());

        std::env::set_var("CUPSD_ADMIN_PASSWORD", "hunter2");
        bootstrap_admin(&store).unwrap();
        let root = store.read(|c| cupsd_store::users::find(c, "root")).unwrap().unwrap();
        assert!(root.is_admin);
        assert_eq!(root.digest_ha1, auth::compute_ha1("root", "hunter2"));

        // Re-running after a user exists must not overwrite credentials.
        std::env::set_var("CUPSD_ADMIN_PASSWORD", "different");
        bootstrap_admin(&store).unwrap();
        let root_again = store.read(|c| cupsd_store::users::find(c, "root")).unwrap().unwrap();
        assert_eq!(root_again.digest_ha1, auth::compute_ha1("root", "hunter2"));
        std::env::remove_var("CUPSD_ADMIN_PASSWORD");
    }
}
