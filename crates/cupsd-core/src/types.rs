// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Core domain types for the cupsd print service: printers, classes, jobs,
// documents, subscriptions, notifications, users and settings, as persisted
// by `cupsd-store` and manipulated by `cupsd-dispatch`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A printer's run state (RFC 8011 §5.4.12 `printer-state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum PrinterState {
    Idle = 3,
    Processing = 4,
    Stopped = 5,
}

impl PrinterState {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            3 => Some(Self::Idle),
            4 => Some(Self::Processing),
            5 => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// A job's lifecycle state (RFC 8011 §5.3.7 `job-state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum JobState {
    Pending = 3,
    Held = 4,
    Processing = 5,
    ProcessingStopped = 6,
    Canceled = 7,
    Aborted = 8,
    Completed = 9,
}

impl JobState {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            3 => Some(Self::Pending),
            4 => Some(Self::Held),
            5 => Some(Self::Processing),
            6 => Some(Self::ProcessingStopped),
            7 => Some(Self::Canceled),
            8 => Some(Self::Aborted),
            9 => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// `state >= 7 <=> completed_at != nil`.
    pub fn is_terminal(self) -> bool {
        self.as_i32() >= 7
    }
}

/// Fields common to printers and classes, used for attribute emission via the
/// shared `Destination` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationCommon {
    pub id: i64,
    pub name: String,
    pub info: String,
    pub location: String,
    pub geo: String,
    pub org: String,
    pub org_unit: String,
    pub state: PrinterState,
    pub accepting: bool,
    pub shared: bool,
    pub is_default: bool,
    /// Serialized as `"start,end"`.
    pub job_sheets_default: (String, String),
    pub default_options: HashMap<String, String>,
}

/// A concrete printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Printer {
    pub common: DestinationCommon,
    pub device_uri: String,
    pub ppd_name: Option<String>,
}

/// A class: same shared shape as `Printer` minus device fields, plus an
/// ordered list of member printer ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub common: DestinationCommon,
    /// Ordered member printer ids. Members survive class deletion.
    pub members: Vec<i64>,
}

/// Tagged destination variant unifying printers and classes. Operations
/// that only need the shared view should match on
/// `.common()` rather than re-implementing printer/class branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Destination {
    Printer(Printer),
    Class(Class),
}

impl Destination {
    pub fn common(&self) -> &DestinationCommon {
        match self {
            Self::Printer(p) => &p.common,
            Self::Class(c) => &c.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut DestinationCommon {
        match self {
            Self::Printer(p) => &mut p.common,
            Self::Class(c) => &mut c.common,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Self::Class(_))
    }

    /// Resource path segment used in `printer-uri` / `job-printer-uri`
    /// (`/printers/<name>` or `/classes/<name>`).
    pub fn uri_path(&self) -> String {
        match self {
            Self::Printer(p) => format!("/printers/{}", p.common.name),
            Self::Class(c) => format!("/classes/{}", c.common.name),
        }
    }
}

/// A print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// Owning printer. Class jobs are bound to a concrete member at creation
    /// and this reference is exclusive (`move` rewrites it).
    pub printer_id: i64,
    pub name: String,
    pub user_name: String,
    pub options: HashMap<String, String>,
    pub state: JobState,
    pub state_reason: String,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub impressions: i64,
}

impl Job {
    /// `state >= 7 <=> completed_at != nil`.
    pub fn state_invariant_holds(&self) -> bool {
        self.state.is_terminal() == self.completed_at.is_some()
    }
}

/// A document attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub job_id: i64,
    pub file_name: String,
    pub mime_type: String,
    /// Spool path. `None` for virtual banner documents synthesized at read
    /// time.
    pub path: Option<String>,
    pub size_bytes: i64,
    /// Insertion order, 1-based.
    pub number: i64,
}

/// Either a printer or a job, whichever a subscription is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionOwner {
    Printer(i64),
    Job(i64),
}

/// Either a push recipient or a pull method for subscription delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyDelivery {
    Push { recipient_uri: String },
    Pull { method: String },
}

/// A durable interest in events for a printer or job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub owner: SubscriptionOwner,
    pub events: Vec<String>,
    /// 0 = infinite. Job-scoped subscriptions are always 0.
    pub lease_secs: u32,
    pub delivery: NotifyDelivery,
    pub time_interval: u32,
    pub user: String,
    pub user_data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Job-scoped subscriptions never carry a lease.
    pub fn lease_invariant_holds(&self) -> bool {
        match self.owner {
            SubscriptionOwner::Job(_) => self.lease_secs == 0,
            SubscriptionOwner::Printer(_) => true,
        }
    }
}

/// A single delivered event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub subscription_id: i64,
    /// Dense, monotonic per-subscription, starting at 1.
    pub sequence_number: i64,
    pub event: String,
    pub created_at: DateTime<Utc>,
}

/// A local user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// `SHA-256(password)` hex digest; empty means the account cannot
    /// authenticate via Basic until set.
    pub password_hash: String,
    /// May be empty until the first successful Basic auth upgrades it.
    pub digest_ha1: String,
    pub is_admin: bool,
}

/// A free-form server setting. Reserved keys begin with `_`
/// (`_share_printers`, `_user_cancel_any`, `_preserve_job_files`,
/// `_preserve_job_history`, ...). Per-destination ACLs use
/// `printer.<id>.allowed_users` / `.denied_users` and `class.<id>.…`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}
