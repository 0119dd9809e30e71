// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The policy engine. Matches the longest-prefix `Location`, applies its
// IP allow/deny list, finds a `<Limit METHOD>` block scoped under it, and
// decides whether the request needs authentication and who is allowed
// through, with the same JSON-file config-loading shape used elsewhere
// (structured config types plus small pure evaluation functions), adapted
// from encrypted-blob storage to an in-memory ACL table.

use std::collections::HashMap;

use cupsd_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A simple allow/deny IP list. Entries are matched as exact addresses or
/// dotted-prefixes (e.g. `"127."` matches any loopback-range address); a
/// real CIDR parser is an external collaborator this daemon doesn't need to
/// vendor to express the spec's location ACLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Acl {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl Acl {
    pub fn allows(&self, remote_ip: &str) -> bool {
        if self.deny.iter().any(|pattern| matches_ip(pattern, remote_ip)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|pattern| matches_ip(pattern, remote_ip))
    }
}

fn matches_ip(pattern: &str, ip: &str) -> bool {
    if pattern == "*" || pattern == "all" {
        return true;
    }
    ip == pattern || ip.starts_with(pattern)
}

/// The `require-*` directives shared by `Location` and `<Limit>` blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequireSpec {
    pub require_user: bool,
    pub require_admin: bool,
    pub require_users: Vec<String>,
    pub require_groups: Vec<String>,
    /// Limit-only: identity must equal the job's owner.
    pub require_owner: bool,
}

impl RequireSpec {
    pub fn is_empty(&self) -> bool {
        !self.require_user
            && !self.require_admin
            && self.require_users.is_empty()
            && self.require_groups.is_empty()
            && !self.require_owner
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
    pub methods: Vec<String>,
    pub deny_all: bool,
    pub auth_type: Option<String>,
    pub require: RequireSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub path_prefix: String,
    pub acl: Acl,
    pub auth_type: Option<String>,
    pub require: RequireSpec,
    pub limits: Vec<Limit>,
}

impl Location {
    fn limit_for(&self, method: &str) -> Option<&Limit> {
        self.limits
            .iter()
            .find(|l| l.methods.iter().any(|m| m.eq_ignore_ascii_case(method)))
    }
}

/// A per-queue named operation policy (`op-policy`): per-IPP-operation
/// require specs, looked up by the operation's keyword name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpPolicy {
    pub name: String,
    pub op_requires: HashMap<String, RequireSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyEngine {
    pub locations: Vec<Location>,
    pub op_policies: HashMap<String, OpPolicy>,
}

/// The outcome of the preflight check against a `Location`/`<Limit>` pair.
#[derive(Debug, Clone)]
pub enum Preflight<'a> {
    /// Path/IP rule forbids the request outright (HTTP 403).
    Forbidden,
    /// A matching `<Limit>` has `deny-all` (HTTP 403).
    DenyAll,
    /// Authentication is required with this effective auth-type; caller
    /// must invoke the authenticator, then `check_access`.
    RequiresAuth {
        auth_type: Option<&'a str>,
        require: &'a RequireSpec,
    },
    /// No authentication required at all.
    Allowed,
}

impl PolicyEngine {
    /// Loads a policy document from a JSON file, using the same
    /// load-or-default convention as the rest of the daemon's config. A missing file
    /// yields [`PolicyEngine::default_policy`]; a present-but-unparseable
    /// file is an error.
    pub fn load(path: &str) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| Error::Internal(format!("parsing policy file '{path}': {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default_policy()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("serializing policy: {e}")))?;
        std::fs::write(path, json).map_err(Error::Io)
    }

    /// A sensible out-of-the-box policy, matching classic `cupsd.conf`
    /// defaults: `/admin` requires an authenticated admin; printing and
    /// queue browsing over `/ipp/print` is unrestricted at the HTTP layer
    /// (the dispatcher's own admin-only operation gate still applies
    /// per-operation once credentials are available).
    pub fn default_policy() -> Self {
        Self {
            locations: vec![
                Location {
                    path_prefix: "/".to_string(),
                    ..Default::default()
                },
                Location {
                    path_prefix: "/admin".to_string(),
                    auth_type: Some("basic".to_string()),
                    require: RequireSpec { require_admin: true, ..Default::default() },
                    ..Default::default()
                },
            ],
            op_policies: HashMap::new(),
        }
    }

    /// Per-queue op-policy lookup: the `require-*` directives for a named
    /// policy and IPP operation keyword, if that policy names one.
    pub fn op_require(&self, policy_name: &str, op_keyword: &str) -> Option<&RequireSpec> {
        self.op_policies.get(policy_name)?.op_requires.get(op_keyword)
    }

    /// Longest-prefix match over configured locations.
    pub fn match_location(&self, path: &str) -> Option<&Location> {
        self.locations
            .iter()
            .filter(|l| path.starts_with(&l.path_prefix))
            .max_by_key(|l| l.path_prefix.len())
    }

    /// Preflight: match the longest-prefix location; check its ACL;
    /// find a `<Limit METHOD>`; apply `deny-all`; else decide whether auth is
    /// required, preferring the limit's directives over the location's.
    pub fn preflight(&self, path: &str, method: &str, remote_ip: &str) -> Preflight<'_> {
        let Some(location) = self.match_location(path) else {
            // An unconfigured path has no restrictions.
            return Preflight::Allowed;
        };

        if !location.acl.allows(remote_ip) {
            return Preflight::Forbidden;
        }

        let limit = location.limit_for(method);
        if let Some(limit) = limit {
            if limit.deny_all {
                return Preflight::DenyAll;
            }
            let needs_auth = limit.auth_type.is_some() || !limit.require.is_empty();
            if needs_auth {
                return Preflight::RequiresAuth {
                    auth_type: limit.auth_type.as_deref(),
                    require: &limit.require,
                };
            }
            return Preflight::Allowed;
        }

        let needs_auth = location.auth_type.is_some() || !location.require.is_empty();
        if needs_auth {
            return Preflight::RequiresAuth {
                auth_type: location.auth_type.as_deref(),
                require: &location.require,
            };
        }
        Preflight::Allowed
    }
}

/// Evaluates `require-*` directives against an authenticated identity, in
/// order of specificity: admin-only first, then ownership, then an explicit
/// user list, then group membership, and finally "any authenticated user".
pub fn check_access(
    require: &RequireSpec,
    username: &str,
    is_admin: bool,
    job_owner: Option<&str>,
    user_groups: &[String],
) -> bool {
    if require.is_empty() {
        return true;
    }
    if require.require_admin {
        return is_admin;
    }
    if require.require_owner {
        if is_admin {
            return true;
        }
        return job_owner.is_some_and(|owner| owner.eq_ignore_ascii_case(username));
    }
    if !require.require_users.is_empty() {
        return require
            .require_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case(username));
    }
    if !require.require_groups.is_empty() {
        let in_declared_group = require
            .require_groups
            .iter()
            .any(|g| user_groups.iter().any(|ug| ug.eq_ignore_ascii_case(g)));
        let admin_via_system_token = is_admin
            && require
                .require_groups
                .iter()
                .any(|g| g == "@SYSTEM" || g.eq_ignore_ascii_case("admin"));
        return in_declared_group || admin_via_system_token;
    }
    if require.require_user {
        return true; // any authenticated identity
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_location() -> Location {
        Location {
            path_prefix: "/admin".to_string(),
            acl: Acl::default(),
            auth_type: Some("basic".to_string()),
            require: RequireSpec { require_admin: true, ..Default::default() },
            limits: vec![],
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let engine = PolicyEngine {
            locations: vec![
                Location { path_prefix: "/".to_string(), ..Default::default() },
                admin_location(),
            ],
            op_policies: HashMap::new(),
        };
        let matched = engine.match_location("/admin/config").unwrap();
        assert_eq!(matched.path_prefix, "/admin");
    }

    #[test]
    fn denied_ip_forbidden() {
        let mut location = admin_location();
        location.acl.deny.push("10.0.0.".to_string());
        let engine = PolicyEngine { locations: vec![location], op_policies: HashMap::new() };
        let decision = engine.preflight("/admin", "GET", "10.0.0.5");
        assert!(matches!(decision, Preflight::Forbidden));
    }

    #[test]
    fn limit_deny_all_wins() {
        let mut location = Location { path_prefix: "/printers".to_string(), ..Default::default() };
        location.limits.push(Limit {
            methods: vec!["DELETE".to_string()],
            deny_all: true,
            ..Default::default()
        });
        let engine = PolicyEngine { locations: vec![location], op_policies: HashMap::new() };
        let decision = engine.preflight("/printers/foo", "DELETE", "127.0.0.1");
        assert!(matches!(decision, Preflight::DenyAll));
    }

    #[test]
    fn admin_location_requires_auth() {
        let engine = PolicyEngine { locations: vec![admin_location()], op_policies: HashMap::new() };
        match engine.preflight("/admin", "GET", "127.0.0.1") {
            Preflight::RequiresAuth { require, .. } => assert!(require.require_admin),
            other => panic!("expected RequiresAuth, got {other:?}"),
        }
    }

    #[test]
    fn check_access_admin_only() {
        let require = RequireSpec { require_admin: true, ..Default::default() };
        assert!(!check_access(&require, "alice", false, None, &[]));
        assert!(check_access(&require, "root", true, None, &[]));
    }

    #[test]
    fn check_access_owner_matches_case_insensitively() {
        let require = RequireSpec { require_owner: true, ..Default::default() };
        assert!(check_access(&require, "Alice", false, Some("alice"), &[]));
        assert!(!check_access(&require, "bob", false, Some("alice"), &[]));
    }

    #[test]
    fn check_access_group_membership_or_admin_system_token() {
        let require = RequireSpec {
            require_groups: vec!["lpadmin".to_string()],
            ..Default::default()
        };
        assert!(check_access(&require, "alice", false, None, &["lpadmin".to_string()]));
        assert!(!check_access(&require, "bob", false, None, &["users".to_string()]));
    }

    #[test]
    fn check_access_require_user_allows_any_authenticated() {
        let require = RequireSpec { require_user: true, ..Default::default() };
        assert!(check_access(&require, "anyone", false, None, &[]));
    }

    #[test]
    fn default_policy_guards_admin_but_not_root() {
        let policy = PolicyEngine::default_policy();
        assert!(matches!(policy.preflight("/", "POST", "127.0.0.1"), Preflight::Allowed));
        match policy.preflight("/admin/config", "GET", "127.0.0.1") {
            Preflight::RequiresAuth { require, .. } => assert!(require.require_admin),
            other => panic!("expected RequiresAuth, got {other:?}"),
        }
    }

    #[test]
    fn missing_policy_file_yields_default() {
        let policy = PolicyEngine::load("/nonexistent/cupsd-policy.json").unwrap();
        assert_eq!(policy.locations.len(), PolicyEngine::default_policy().locations.len());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let path = path.to_str().unwrap();
        let policy = PolicyEngine::default_policy();
        policy.save(path).unwrap();
        let loaded = PolicyEngine::load(path).unwrap();
        assert_eq!(loaded.locations.len(), policy.locations.len());
    }

    #[test]
    fn op_require_looks_up_named_policy() {
        let mut op_requires = HashMap::new();
        op_requires.insert(
            "Cancel-Job".to_string(),
            RequireSpec { require_owner: true, ..Default::default() },
        );
        let mut op_policies = HashMap::new();
        op_policies.insert("authenticated".to_string(), OpPolicy { name: "authenticated".to_string(), op_requires });
        let engine = PolicyEngine { locations: vec![], op_policies };
        let require = engine.op_require("authenticated", "Cancel-Job").unwrap();
        assert!(require.require_owner);
        assert!(engine.op_require("authenticated", "Get-Jobs").is_none());
        assert!(engine.op_require("missing", "Cancel-Job").is_none());
    }
}
