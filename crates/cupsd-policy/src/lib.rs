// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// cupsd-policy — the location/limit access-control engine and HTTP
// authenticator. No network I/O lives here; `cupsd-dispatch` calls into this
// crate per-request with whatever transport context it has on hand.

pub mod auth;
pub mod policy;

pub use auth::{authenticate, AuthFailure, AuthRequest, AuthScheme, Identity};
pub use policy::{check_access, Acl, Limit, Location, OpPolicy, PolicyEngine, Preflight, RequireSpec};
