// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Printer/class admin operations: the `Pause-/Resume-/Enable-/
// Disable-Printer` family, bulk system-wide toggles, and the `CUPS-*`
// management extensions (`Add-Modify-Printer/Class`, `Delete-Printer/Class`,
// `Accept-/Reject-Jobs`, `Set-Default`). These mutate `DestinationCommon`
// rows the same way `jobs.rs` mutates job rows: one `Store::write`
// transaction per operation.

use std::collections::HashMap;

use cupsd_core::error::{Error, Result};
use cupsd_core::{Class, Destination, DestinationCommon, Printer, PrinterState};
use cupsd_store::Store;

/// `Pause-Printer` / `Pause-Printer-After-Current-Job`: state -> stopped.
pub fn pause(store: &Store, dest: &Destination) -> Result<()> {
    set_state(store, dest, PrinterState::Stopped)
}

/// `Resume-Printer`: state -> idle.
pub fn resume(store: &Store, dest: &Destination) -> Result<()> {
    set_state(store, dest, PrinterState::Idle)
}

/// `Enable-Printer` / `CUPS-Accept-Jobs`.
pub fn enable(store: &Store, dest: &Destination) -> Result<()> {
    set_accepting(store, dest, true)
}

/// `Disable-Printer` / `CUPS-Reject-Jobs`.
pub fn disable(store: &Store, dest: &Destination) -> Result<()> {
    set_accepting(store, dest, false)
}

/// `Hold-New-Jobs`: stops accepting new submissions without touching the
/// run state, matching CUPS's own distinction between "stopped" and
/// "holding new jobs" (modelled here as `accepting=false` with the printer
/// left `idle`/`processing`).
pub fn hold_new_jobs(store: &Store, dest: &Destination) -> Result<()> {
    set_accepting(store, dest, false)
}

/// `Release-Held-New-Jobs`.
pub fn release_held_new_jobs(store: &Store, dest: &Destination) -> Result<()> {
    set_accepting(store, dest, true)
}

/// `Restart-Printer`: stop then resume, landing back at idle/accepting.
pub fn restart(store: &Store, dest: &Destination) -> Result<()> {
    set_state(store, dest, PrinterState::Idle)?;
    set_accepting(store, dest, true)
}

fn set_state(store: &Store, dest: &Destination, state: PrinterState) -> Result<()> {
    let id = dest.common().id;
    store.write(|c| match dest {
        Destination::Printer(_) => cupsd_store::printers::set_state(c, id, state),
        Destination::Class(_) => cupsd_store::classes::set_all_state(c, state).map(|_| ()),
    })
}

fn set_accepting(store: &Store, dest: &Destination, accepting: bool) -> Result<()> {
    let id = dest.common().id;
    store.write(|c| match dest {
        Destination::Printer(_) => cupsd_store::printers::set_accepting(c, id, accepting),
        Destination::Class(_) => {
            cupsd_store::classes::update_common(c, id, &{
                let mut common = dest.common().clone();
                common.accepting = accepting;
                common
            })
        }
    })
}

/// `Pause-All-Printers` / `Resume-All-Printers` / `Restart-System`: bulk
/// state toggle across every printer and class.
pub fn set_all_state(store: &Store, state: PrinterState) -> Result<()> {
    store.write(|c| {
        cupsd_store::printers::set_all_state(c, state)?;
        cupsd_store::classes::set_all_state(c, state)
    })
}

pub fn set_all_accepting(store: &Store, accepting: bool) -> Result<()> {
    store.write(|c| {
        cupsd_store::printers::set_all_accepting(c, accepting)?;
        cupsd_store::classes::set_all_accepting(c, accepting)
    })
}

/// Fields `CUPS-Add-Modify-Printer` may update on an existing row or seed on
/// a new one. `ppd_name` absent with `ppd_data` present means "store this
/// inline PPD under a sanitized name derived from the printer name".
pub struct PrinterUpdate<'a> {
    pub name: &'a str,
    pub device_uri: &'a str,
    pub ppd_name: Option<&'a str>,
    pub info: &'a str,
    pub location: &'a str,
    pub geo: &'a str,
    pub org: &'a str,
    pub org_unit: &'a str,
    pub shared: bool,
    pub default_options: &'a HashMap<String, String>,
}

/// `CUPS-Add-Modify-Printer`: upsert by name. Only the bare identity and
/// sharing fields are taken from the wire request; `state`/`accepting`
/// default to idle/accepting for a newly created printer and are left
/// untouched on an update (those transition via the dedicated operations
/// above).
pub fn add_modify_printer(store: &Store, req: &PrinterUpdate) -> Result<Printer> {
    store.write(|c| {
        match cupsd_store::printers::find_by_name(c, req.name)? {
            Some(existing) => {
                let mut common = existing.common.clone();
                common.info = req.info.to_string();
                common.location = req.location.to_string();
                common.geo = req.geo.to_string();
                common.org = req.org.to_string();
                common.org_unit = req.org_unit.to_string();
                common.shared = req.shared;
                common.default_options = req.default_options.clone();
                cupsd_store::printers::update_common(c, existing.common.id, &common)?;
                cupsd_store::printers::get(c, existing.common.id)
            }
            None => {
                let id = cupsd_store::printers::insert(
                    c,
                    &cupsd_store::printers::NewPrinter {
                        name: req.name,
                        device_uri: req.device_uri,
                        ppd_name: req.ppd_name,
                        info: req.info,
                        location: req.location,
                        geo: req.geo,
                        org: req.org,
                        org_unit: req.org_unit,
                        shared: req.shared,
                        default_options: req.default_options,
                    },
                )?;
                cupsd_store::printers::get(c, id)
            }
        }
    })
}

/// `CUPS-Delete-Printer`: cascades (jobs/documents/subscriptions via
/// `ON DELETE CASCADE`) and cleans up the `printer.<id>.*` ACL settings the
/// schema doesn't own.
pub fn delete_printer(store: &Store, id: i64) -> Result<()> {
    store.write(|c| {
        cupsd_store::printers::get(c, id)?;
        cupsd_store::printers::delete(c, id)?;
        cupsd_store::settings::delete_prefixed(c, &format!("printer.{id}."))
    })
}

/// `CUPS-Add-Modify-Class`: upsert by name with an explicit ordered member
/// list (replaces wholesale, matching `classes::set_members`).
pub fn add_modify_class(
    store: &Store,
    name: &str,
    info: &str,
    location: &str,
    shared: bool,
    default_options: &HashMap<String, String>,
    members: &[i64],
) -> Result<Class> {
    store.write(|c| match cupsd_store::classes::find_by_name(c, name)? {
        Some(existing) => {
            let mut common = existing.common.clone();
            common.info = info.to_string();
            common.location = location.to_string();
            common.shared = shared;
            common.default_options = default_options.clone();
            cupsd_store::classes::update_common(c, existing.common.id, &common)?;
            cupsd_store::classes::set_members(c, existing.common.id, members)?;
            cupsd_store::classes::get(c, existing.common.id)
        }
        None => {
            let id = cupsd_store::classes::insert(c, name, info, location, members)?;
            if shared || !default_options.is_empty() {
                let mut common = cupsd_store::classes::get(c, id)?.common;
                common.shared = shared;
                common.default_options = default_options.clone();
                cupsd_store::classes::update_common(c, id, &common)?;
            }
            cupsd_store::classes::get(c, id)
        }
    })
}

pub fn delete_class(store: &Store, id: i64) -> Result<()> {
    store.write(|c| {
        cupsd_store::classes::get(c, id)?;
        cupsd_store::classes::delete(c, id)?;
        cupsd_store::settings::delete_prefixed(c, &format!("class.{id}."))
    })
}

/// `CUPS-Set-Default`: toggles the single `is_default` row across
/// printers+classes. `kind` disambiguates same-named
/// printer/class collisions; `Destination` is resolved by the caller and
/// passed in by id.
pub fn set_default(store: &Store, dest: &Destination) -> Result<()> {
    let id = dest.common().id;
    store.write(|c| match dest {
        Destination::Printer(_) => cupsd_store::printers::set_default(c, id),
        Destination::Class(_) => cupsd_store::classes::set_default(c, id),
    })
}

/// `Set-Printer-Attributes`: scenario S6 — only the human-readable identity
/// fields (`printer-info`, `printer-location`, `printer-geo-location`,
/// `printer-organization`, `printer-organizational-unit`) are settable here;
/// `default_options` is untouched even if the request carries a stray
/// `printer-error-policy` in the printer group, since that's a job-template
/// default and has its own update path (`CUPS-Add-Modify-Printer`).
pub fn set_printer_attributes(
    store: &Store,
    printer_id: i64,
    info: Option<&str>,
    location: Option<&str>,
    geo: Option<&str>,
    org: Option<&str>,
    org_unit: Option<&str>,
) -> Result<()> {
    store.write(|c| {
        let printer = cupsd_store::printers::get(c, printer_id)?;
        let mut common: DestinationCommon = printer.common;
        if let Some(v) = info {
            common.info = v.to_string();
        }
        if let Some(v) = location {
            common.location = v.to_string();
        }
        if let Some(v) = geo {
            common.geo = v.to_string();
        }
        if let Some(v) = org {
            common.org = v.to_string();
        }
        if let Some(v) = org_unit {
            common.org_unit = v.to_string();
        }
        cupsd_store::printers::update_common(c, printer_id, &common)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_printer(store: &Store, name: &str) -> Printer {
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
                        default_options: &HashMap::new(),
                    },
                )
            })
            .unwrap();
        store.read(|c| cupsd_store::printers::get(c, id)).unwrap()
    }

    #[test]
    fn pause_then_resume_round_trips_state() {
        let store = Store::open_in_memory().unwrap();
        let printer = new_printer(&store, "office");
        let dest = Destination::Printer(printer.clone());
        pause(&store, &dest).unwrap();
        let reloaded = store.read(|c| cupsd_store::printers::get(c, printer.common.id)).unwrap();
        assert_eq!(reloaded.common.state, PrinterState::Stopped);
        resume(&store, &dest).unwrap();
        let reloaded = store.read(|c| cupsd_store::printers::get(c, printer.common.id)).unwrap();
        assert_eq!(reloaded.common.state, PrinterState::Idle);
    }

    #[test]
    fn delete_printer_is_not_found_after_delete() {
        let store = Store::open_in_memory().unwrap();
        let printer = new_printer(&store, "office");
        delete_printer(&store, printer.common.id).unwrap();
        let err = store.read(|c| cupsd_store::printers::get(c, printer.common.id)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn set_printer_attributes_leaves_default_options_untouched() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .write(|c| {
                cupsd_store::printers::insert(
                    c,
                    &cupsd_store::printers::NewPrinter {
                        name: "office",
                        device_uri: "socket://127.0.0.1",
                        ppd_name: None,
                        info: "",
                        location: "",
                        geo: "",
                        org: "",
                        org_unit: "",
                        shared: true,
                        default_options: &HashMap::from([(
                            "printer-error-policy".to_string(),
                            "abort-job".to_string(),
                        )]),
                    },
                )
            })
            .unwrap();

        set_printer_attributes(&store, id, Some("2nd floor"), Some("hq"), None, None, None).unwrap();
        let printer = store.read(|c| cupsd_store::printers::get(c, id)).unwrap();
        assert_eq!(printer.common.info, "2nd floor");
        assert_eq!(printer.common.location, "hq");
        assert_eq!(
            printer.common.default_options.get("printer-error-policy"),
            Some(&"abort-job".to_string())
        );
    }

    #[test]
    fn add_modify_class_replaces_member_list() {
        let store = Store::open_in_memory().unwrap();
        let p1 = new_printer(&store, "p1").common.id;
        let p2 = new_printer(&store, "p2").common.id;
        let class = add_modify_class(&store, "grp", "", "", true, &HashMap::new(), &[p1]).unwrap();
        assert_eq!(class.members, vec![p1]);
        let class = add_modify_class(&store, "grp", "", "", true, &HashMap::new(), &[p2, p1]).unwrap();
        assert_eq!(class.members, vec![p2, p1]);
    }
}
