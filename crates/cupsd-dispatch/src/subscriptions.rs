// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The subscription & notification engine. `Create-*-Subscriptions`
// validates the delivery mode, `Get-Notifications` folds per-subscription
// event rows into the `notify-get-interval` hint.

use chrono::Utc;
use cupsd_core::error::{Error, Result};
use cupsd_core::{JobState, Notification, NotifyDelivery, PrinterState, Subscription, SubscriptionOwner};
use cupsd_store::Store;

/// Request shape for `Create-Printer-Subscriptions` / `Create-Job-Subscriptions`.
pub struct NewSubscriptionRequest<'a> {
    pub owner: SubscriptionOwner,
    pub events: Vec<String>,
    /// Ignored (forced to 0) for job-scoped subscriptions.
    pub lease_secs: u32,
    pub recipient_uri: Option<&'a str>,
    pub pull_method: Option<&'a str>,
    pub time_interval: u32,
    pub user: &'a str,
    pub user_data: Vec<u8>,
}

/// Resolves the `notify-recipient-uri` xor `notify-pull-method` pair into a
/// `NotifyDelivery`, rejecting anything but the `ippget` scheme/method.
fn resolve_delivery(recipient_uri: Option<&str>, pull_method: Option<&str>) -> Result<NotifyDelivery> {
    match (recipient_uri, pull_method) {
        (Some(uri), None) => {
            let scheme = uri.split(':').next().unwrap_or("");
            if scheme != "ippget" {
                return Err(Error::AttributesOrValuesNotSupported(format!(
                    "notify-recipient-uri scheme '{scheme}' not supported"
                )));
            }
            Ok(NotifyDelivery::Push { recipient_uri: uri.to_string() })
        }
        (None, Some(method)) => {
            if method != "ippget" {
                return Err(Error::AttributesOrValuesNotSupported(format!(
                    "notify-pull-method '{method}' not supported"
                )));
            }
            Ok(NotifyDelivery::Pull { method: method.to_string() })
        }
        (None, None) => Ok(NotifyDelivery::Pull { method: "ippget".to_string() }),
        (Some(_), Some(_)) => Err(Error::BadRequest(
            "notify-recipient-uri and notify-pull-method are mutually exclusive".to_string(),
        )),
    }
}

/// `Create-Printer-Subscriptions` / `Create-Job-Subscriptions`.
pub fn create(store: &Store, req: NewSubscriptionRequest) -> Result<Subscription> {
    let delivery = resolve_delivery(req.recipient_uri, req.pull_method)?;
    let lease_secs = match req.owner {
        SubscriptionOwner::Job(_) => 0,
        SubscriptionOwner::Printer(_) => req.lease_secs,
    };
    let events = if req.events.is_empty() { vec!["all".to_string()] } else { req.events };

    store.write(|c| {
        let sub = Subscription {
            id: 0,
            owner: req.owner,
            events,
            lease_secs,
            delivery,
            time_interval: req.time_interval,
            user: req.user.to_string(),
            user_data: req.user_data,
            created_at: Utc::now(),
        };
        let id = cupsd_store::subscriptions::insert(c, &sub)?;
        cupsd_store::subscriptions::get(c, id)
    })
}

fn owns_or_admin(sub: &Subscription, username: &str, is_admin: bool) -> bool {
    is_admin || sub.user.eq_ignore_ascii_case(username)
}

fn require_owner(sub: &Subscription, username: &str, is_admin: bool) -> Result<()> {
    if owns_or_admin(sub, username, is_admin) {
        Ok(())
    } else {
        Err(Error::NotAuthorized(format!("subscription {} is not owned by {username}", sub.id)))
    }
}

/// `Get-Subscription-Attributes`.
pub fn get(store: &Store, id: i64, username: &str, is_admin: bool) -> Result<Subscription> {
    let sub = store.read(|c| cupsd_store::subscriptions::get(c, id))?;
    require_owner(&sub, username, is_admin)?;
    Ok(sub)
}

/// `Get-Subscriptions`: the requester's own subscriptions, or every
/// subscription for an admin when `my_subscriptions` is false.
pub fn list(store: &Store, username: &str, is_admin: bool, my_subscriptions: bool) -> Result<Vec<Subscription>> {
    store.read(|c| {
        if !my_subscriptions && is_admin {
            cupsd_store::subscriptions::list_all(c)
        } else {
            cupsd_store::subscriptions::list_for_user(c, username)
        }
    })
}

/// `Renew-Subscription`: job-scoped subscriptions are non-renewable
/// Job-scoped subscriptions never carry a lease.
pub fn renew(store: &Store, id: i64, username: &str, is_admin: bool, lease_secs: u32) -> Result<()> {
    store.write(|c| {
        let sub = cupsd_store::subscriptions::get(c, id)?;
        require_owner(&sub, username, is_admin)?;
        if matches!(sub.owner, SubscriptionOwner::Job(_)) {
            return Err(Error::NotPossible(format!("subscription {id} is job-scoped and cannot be renewed")));
        }
        cupsd_store::subscriptions::renew(c, id, lease_secs)
    })
}

/// `Cancel-Subscription`.
pub fn cancel(store: &Store, id: i64, username: &str, is_admin: bool) -> Result<()> {
    store.write(|c| {
        let sub = cupsd_store::subscriptions::get(c, id)?;
        require_owner(&sub, username, is_admin)?;
        cupsd_store::subscriptions::delete(c, id)
    })
}

/// `Get-Notifications` response payload: the matching notification records
/// plus the `notify-get-interval` hint.
pub struct NotificationsPage {
    pub notifications: Vec<Notification>,
    pub get_interval: u32,
    /// True when the referenced job/printer reached a terminal state this
    /// poll should be the last for (status becomes
    /// `successful-ok-events-complete`).
    pub events_complete: bool,
}

/// `Get-Notifications`: events since `min_seq` for one subscription, capped
/// at `limit` (0 = unbounded), plus the polling-interval hint derived from
/// the subscription's owner state.
pub fn get_notifications(
    store: &Store,
    sub_id: i64,
    username: &str,
    is_admin: bool,
    min_seq: i64,
    limit: u32,
) -> Result<NotificationsPage> {
    store.read(|c| {
        let sub = cupsd_store::subscriptions::get(c, sub_id)?;
        require_owner(&sub, username, is_admin)?;
        let notifications = cupsd_store::notifications::list_since(c, sub_id, min_seq, limit)?;

        let (get_interval, events_complete) = match sub.owner {
            SubscriptionOwner::Job(job_id) => {
                let job = cupsd_store::jobs::get(c, job_id)?;
                if job.state.is_terminal() {
                    (0, true)
                } else if job.state == JobState::Processing {
                    (10, false)
                } else {
                    (60, false)
                }
            }
            SubscriptionOwner::Printer(printer_id) => {
                let printer = cupsd_store::printers::get(c, printer_id)?;
                if printer.common.state == PrinterState::Stopped {
                    (30, false)
                } else {
                    (60, false)
                }
            }
        };

        Ok(NotificationsPage { notifications, get_interval, events_complete })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn create_rejects_non_ippget_recipient_scheme() {
        let store = store();
        let err = create(
            &store,
            NewSubscriptionRequest {
                owner: SubscriptionOwner::Printer(1),
                events: vec![],
                lease_secs: 0,
                recipient_uri: Some("mailto:ops@example.com"),
                pull_method: None,
                time_interval: 0,
                user: "alice",
                user_data: vec![],
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::AttributesOrValuesNotSupported(_)));
    }

    #[test]
    fn job_scoped_subscription_forces_zero_lease() {
        let store = store();
        let sub = create(
            &store,
            NewSubscriptionRequest {
                owner: SubscriptionOwner::Job(1),
                events: vec![],
                lease_secs: 3600,
                recipient_uri: None,
                pull_method: None,
                time_interval: 0,
                user: "alice",
                user_data: vec![],
            },
        )
        .unwrap();
        assert_eq!(sub.lease_secs, 0);
        assert!(sub.lease_invariant_holds());
    }

    #[test]
    fn renew_job_scoped_subscription_is_not_possible() {
        let store = store();
        let sub = create(
            &store,
            NewSubscriptionRequest {
                owner: SubscriptionOwner::Job(1),
                events: vec![],
                lease_secs: 0,
                recipient_uri: None,
                pull_method: None,
                time_interval: 0,
                user: "alice",
                user_data: vec![],
            },
        )
        .unwrap();
        let err = renew(&store, sub.id, "alice", false, 100).unwrap_err();
        assert!(matches!(err, Error::NotPossible(_)));
    }

    #[test]
    fn non_owner_cannot_read_subscription() {
        let store = store();
        let sub = create(
            &store,
            NewSubscriptionRequest {
                owner: SubscriptionOwner::Printer(1),
                events: vec![],
                lease_secs: 0,
                recipient_uri: None,
                pull_method: None,
                time_interval: 0,
                user: "alice",
                user_data: vec![],
            },
        )
        .unwrap();
        let err = get(&store, sub.id, "bob", false).unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));
        get(&store, sub.id, "bob", true).unwrap();
    }
}
