// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The destination resolver. Turns a `printer-uri` operation attribute
// and/or the HTTP request path into a concrete `Printer` or `Class` row, and
// picks a concrete class member when a job needs to bind to one device.

use std::collections::HashMap;

use cupsd_core::error::{Error, Result};
use cupsd_core::{Class, Destination, Printer};
use cupsd_store::Store;
use rusqlite::Connection;

/// Parses `.../printers/<name>` or `.../classes/<name>` out of a URI or
/// plain request path, tolerating a scheme+host prefix on the former.
fn parse_destination_path(path: &str) -> Option<(&'static str, &str)> {
    if let Some(idx) = path.find("/printers/") {
        let name = &path[idx + "/printers/".len()..];
        let name = name.split(['/', '?']).next().unwrap_or("");
        if !name.is_empty() {
            return Some(("printer", name));
        }
    }
    if let Some(idx) = path.find("/classes/") {
        let name = &path[idx + "/classes/".len()..];
        let name = name.split(['/', '?']).next().unwrap_or("");
        if !name.is_empty() {
            return Some(("class", name));
        }
    }
    None
}

fn resolve_named(store: &Store, kind: &str, name: &str) -> Result<Option<Destination>> {
    store.read(|c| {
        if kind == "printer" {
            Ok(cupsd_store::printers::find_by_name(c, name)?.map(Destination::Printer))
        } else {
            Ok(cupsd_store::classes::find_by_name(c, name)?.map(Destination::Class))
        }
    })
}

/// Resolution order: `printer-uri` operation attribute, then the
/// request path, then the server default (ties broken printer-first, else
/// lowest id).
pub fn resolve_destination(
    store: &Store,
    printer_uri: Option<&str>,
    request_path: &str,
) -> Result<Destination> {
    if let Some(uri) = printer_uri {
        if let Some((kind, name)) = parse_destination_path(uri) {
            if let Some(dest) = resolve_named(store, kind, name)? {
                return Ok(dest);
            }
            return Err(Error::NotFound(format!("no such {kind} '{name}'")));
        }
    }

    if let Some((kind, name)) = parse_destination_path(request_path) {
        if let Some(dest) = resolve_named(store, kind, name)? {
            return Ok(dest);
        }
        return Err(Error::NotFound(format!("no such {kind} '{name}'")));
    }

    store.read(|c| {
        if let Some(p) = cupsd_store::printers::default_printer(c)? {
            return Ok(Destination::Printer(p));
        }
        if let Some(cl) = cupsd_store::classes::default_class(c)? {
            return Ok(Destination::Class(cl));
        }
        if let Some(p) = cupsd_store::printers::lowest_id(c)? {
            return Ok(Destination::Printer(p));
        }
        Err(Error::NotFound("no destinations configured".into()))
    })
}

/// Linear scan for the first `accepting=true` member, in stored order. Takes
/// an open connection so callers already inside a `Store::write`/`read`
/// transaction don't re-enter the store's mutex.
pub fn pick_accepting_member_tx(conn: &Connection, class: &Class) -> Result<Printer> {
    for printer_id in &class.members {
        let printer = cupsd_store::printers::get(conn, *printer_id)?;
        if printer.common.accepting {
            return Ok(printer);
        }
    }
    Err(Error::NotAcceptingJobs(format!(
        "class '{}' has no accepting members",
        class.common.name
    )))
}

/// Standalone-transaction convenience wrapper for callers outside an
/// in-progress `Store` transaction (e.g. tests, or the dispatcher resolving
/// a destination before opening its own write).
pub fn pick_accepting_member(store: &Store, class: &Class) -> Result<Printer> {
    store.read(|c| pick_accepting_member_tx(c, class))
}

/// Job default-options a class passes down to a job bound to one of its
/// members: the class's non-empty default-option keys that the target
/// printer doesn't already declare, plus the class's `job_sheets_default`
/// when non-empty, plus an explicit `cups-error-policy` passthrough when the
/// class carries one (it always wins over any printer-level value).
pub fn class_inherited_options(class: &Class, member: &Printer) -> HashMap<String, String> {
    let mut options = member.common.default_options.clone();
    for (key, value) in &class.common.default_options {
        if value.is_empty() {
            continue;
        }
        options.entry(key.clone()).or_insert_with(|| value.clone());
    }
    if let Some(policy) = class.common.default_options.get("cups-error-policy") {
        if !policy.is_empty() {
            options.insert("cups-error-policy".to_string(), policy.clone());
        }
    }
    options
}

/// The class's own `job_sheets_default`, when non-empty, otherwise the
/// member printer's.
pub fn effective_job_sheets(class: &Class, member: &Printer) -> (String, String) {
    let (start, end) = &class.common.job_sheets_default;
    if start != "none" || end != "none" {
        return (start.clone(), end.clone());
    }
    member.common.job_sheets_default.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cupsd_core::DestinationCommon;

    fn store_with_printer(name: &str, accepting: bool) -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .write(|c| {
                cupsd_store::printers::insert(
                    c,
                    &cupsd_store::printers::NewPrinter {
                        name,
                        device_uri: "socket://127.0.0.1",
                        ppd_name: None,
                        info: "",
                        location: "",
                        geo: "",
                        org: "",
                        org_unit: "",
                        shared: true,
                        default_options: &Default::default(),
                    },
                )
            })
            .unwrap();
        if !accepting {
            store.write(|c| cupsd_store::printers::set_accepting(c, id, false)).unwrap();
        }
        (store, id)
    }

    #[test]
    fn resolves_printer_from_uri_path() {
        let (store, _id) = store_with_printer("office", true);
        let dest = resolve_destination(&store, Some("ipp://host/printers/office"), "/ipp/print").unwrap();
        assert_eq!(dest.common().name, "office");
        assert!(!dest.is_class());
    }

    #[test]
    fn falls_back_to_request_path_then_server_default() {
        let (store, id) = store_with_printer("office", true);
        store.write(|c| cupsd_store::printers::set_default(c, id)).unwrap();

        let dest = resolve_destination(&store, None, "/printers/office").unwrap();
        assert_eq!(dest.common().name, "office");

        let dest = resolve_destination(&store, None, "/ipp/print").unwrap();
        assert_eq!(dest.common().name, "office");
    }

    #[test]
    fn unknown_named_destination_is_not_found() {
        let (store, _id) = store_with_printer("office", true);
        let err = resolve_destination(&store, Some("ipp://host/printers/nope"), "/ipp/print").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn class_member_scan_skips_non_accepting() {
        let store = Store::open_in_memory().unwrap();
        let (p1, p2) = store
            .write(|c| {
                let p1 = cupsd_store::printers::insert(
                    c,
                    &cupsd_store::printers::NewPrinter {
                        name: "p1",
                        device_uri: "socket://127.0.0.1",
                        ppd_name: None,
                        info: "",
                        location: "",
                        geo: "",
                        org: "",
                        org_unit: "",
                        shared: true,
                        default_options: &Default::default(),
                    },
                )?;
                let p2 = cupsd_store::printers::insert(
                    c,
                    &cupsd_store::printers::NewPrinter {
                        name: "p2",
                        device_uri: "socket://127.0.0.1",
                        ppd_name: None,
                        info: "",
                        location: "",
                        geo: "",
                        org: "",
                        org_unit: "",
                        shared: true,
                        default_options: &Default::default(),
                    },
                )?;
                cupsd_store::printers::set_accepting(c, p1, false)?;
                Ok((p1, p2))
            })
            .unwrap();
        let class_id = store.write(|c| cupsd_store::classes::insert(c, "grp", "", "", &[p1, p2])).unwrap();
        let class = store.read(|c| cupsd_store::classes::get(c, class_id)).unwrap();
        let picked = pick_accepting_member(&store, &class).unwrap();
        assert_eq!(picked.common.name, "p2");
    }

    #[test]
    fn class_error_policy_overrides_member_default() {
        let class = Class {
            common: DestinationCommon {
                id: 1,
                name: "grp".into(),
                info: String::new(),
                location: String::new(),
                geo: String::new(),
                org: String::new(),
                org_unit: String::new(),
                state: cupsd_core::PrinterState::Idle,
                accepting: true,
                shared: true,
                is_default: false,
                job_sheets_default: ("none".into(), "none".into()),
                default_options: HashMap::from([("cups-error-policy".to_string(), "retry-job".to_string())]),
            },
            members: vec![1],
        };
        let member = Printer {
            common: DestinationCommon {
                id: 1,
                name: "p1".into(),
                info: String::new(),
                location: String::new(),
                geo: String::new(),
                org: String::new(),
                org_unit: String::new(),
                state: cupsd_core::PrinterState::Idle,
                accepting: true,
                shared: true,
                is_default: false,
                job_sheets_default: ("none".into(), "none".into()),
                default_options: HashMap::from([("cups-error-policy".to_string(), "abort-job".to_string())]),
            },
            device_uri: "socket://127.0.0.1".into(),
            ppd_name: None,
        };
        let options = class_inherited_options(&class, &member);
        assert_eq!(options.get("cups-error-policy"), Some(&"retry-job".to_string()));
    }
}
