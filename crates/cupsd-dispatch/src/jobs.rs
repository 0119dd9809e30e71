// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The job/queue state machine. Every function here runs its body
// inside a single `Store::write` transaction (or is meant to be called from
// one by the dispatcher), keeping "all mutations execute in a single
// serializable transaction" rule.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cupsd_core::error::{Error, Result};
use cupsd_core::{Destination, Job, JobState};
use cupsd_ipp::{options as ipp_options, Caps, ParsedPpd};
use cupsd_store::Store;
use rusqlite::Connection;

use crate::destinations;

/// Whether `job-hold-until` (if present and not `no-hold`) should park a new
/// or updated job in the held state.
fn holds(options: &HashMap<String, String>) -> bool {
    options
        .get("job-hold-until")
        .is_some_and(|v| !v.is_empty() && v != "no-hold")
}

/// Resolves the concrete printer a new job binds to, validates the request's
/// options against synthesized capabilities and PPD constraints, and returns
/// the printer id plus the fully merged option map the job should store.
fn prepare_job_options(
    dest: &Destination,
    conn: &Connection,
    requested: HashMap<String, String>,
    caps: &Caps,
    ppd: Option<&ParsedPpd>,
) -> Result<(i64, HashMap<String, String>)> {
    if !dest.common().accepting {
        return Err(Error::NotAcceptingJobs(dest.common().name.clone()));
    }

    let printer_id = match dest {
        Destination::Printer(p) => p.common.id,
        Destination::Class(class) => {
            let member = destinations::pick_accepting_member_tx(conn, class)?;
            let mut merged = destinations::class_inherited_options(class, &member);
            merged.extend(requested.clone());
            ipp_options::validate(&merged, caps, ppd)?;
            return Ok((member.common.id, merged));
        }
    };

    let mut merged = dest.common().default_options.clone();
    merged.extend(requested);
    ipp_options::validate(&merged, caps, ppd)?;
    Ok((printer_id, merged))
}

pub struct NewJobRequest<'a> {
    pub user_name: &'a str,
    pub job_name: &'a str,
    pub options: HashMap<String, String>,
    pub document_format: Option<&'a str>,
}

/// `Print-Job` / `Create-Job`: validates the destination and options, then
/// inserts the job row in the appropriate initial state (held vs. queued).
pub fn create_job(
    store: &Store,
    dest: &Destination,
    req: NewJobRequest,
    caps: &Caps,
    ppd: Option<&ParsedPpd>,
) -> Result<Job> {
    if let Some(format) = req.document_format {
        if format != "application/octet-stream" && !caps.document_format_supported.iter().any(|f| f == format) {
            return Err(Error::DocumentFormatNotSupported(format.to_string()));
        }
    }

    store.write(|c| {
        let (printer_id, options) = prepare_job_options(dest, c, req.options.clone(), caps, ppd)?;
        let state = if holds(&options) { JobState::Held } else { JobState::Pending };
        let state_reason = if state == JobState::Held { "job-held-by-user" } else { "none" };
        let id = cupsd_store::jobs::insert(
            c,
            &cupsd_store::jobs::NewJob {
                printer_id,
                name: req.job_name,
                user_name: req.user_name,
                options: &options,
                state,
                state_reason,
            },
        )?;
        cupsd_store::jobs::get(c, id)
    })
}

/// Spools document bytes under `<spool_dir>/<job_id>/<number>-<file_name>`
/// and records the document row. Runs outside the metadata transaction's
/// atomicity boundary ("file bytes on disk are auxiliary").
pub fn spool_document(
    store: &Store,
    spool_dir: &str,
    job_id: i64,
    file_name: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Result<()> {
    let job_dir = Path::new(spool_dir).join(job_id.to_string());
    std::fs::create_dir_all(&job_dir)?;
    let number = store.read(|c| cupsd_store::documents::list_for_job(c, job_id))?.len() as i64 + 1;
    let safe_name = sanitize_file_name(file_name);
    let path: PathBuf = job_dir.join(format!("{number}-{safe_name}"));
    std::fs::write(&path, bytes)?;
    store.write(|c| {
        cupsd_store::documents::insert(
            c,
            job_id,
            file_name,
            mime_type,
            path.to_string_lossy().as_ref(),
            bytes.len() as i64,
        )
    })?;
    Ok(())
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

fn owns_or_admin(job: &Job, username: &str, is_admin: bool, user_cancel_any: bool) -> bool {
    is_admin || user_cancel_any || job.user_name.eq_ignore_ascii_case(username)
}

fn require_owner(job: &Job, username: &str, is_admin: bool, user_cancel_any: bool) -> Result<()> {
    if owns_or_admin(job, username, is_admin, user_cancel_any) {
        Ok(())
    } else {
        Err(Error::NotAuthorized(format!("job {} is not owned by {username}", job.id)))
    }
}

/// `Close-Job`: queues a job still below the terminal threshold.
pub fn close_job(store: &Store, job_id: i64, username: &str, is_admin: bool) -> Result<()> {
    store.write(|c| {
        let job = cupsd_store::jobs::get(c, job_id)?;
        require_owner(&job, username, is_admin, false)?;
        if !job.state.is_terminal() {
            cupsd_store::jobs::set_state(c, job_id, JobState::Pending, "none")?;
        }
        Ok(())
    })
}

/// `Hold-Job`.
pub fn hold_job(store: &Store, job_id: i64, username: &str, is_admin: bool) -> Result<()> {
    store.write(|c| {
        let job = cupsd_store::jobs::get(c, job_id)?;
        require_owner(&job, username, is_admin, false)?;
        cupsd_store::jobs::set_state(c, job_id, JobState::Held, "job-held-by-user")
    })
}

/// `Release-Job` / `Resume-Job`.
pub fn release_job(store: &Store, job_id: i64, username: &str, is_admin: bool) -> Result<()> {
    store.write(|c| {
        let job = cupsd_store::jobs::get(c, job_id)?;
        require_owner(&job, username, is_admin, false)?;
        cupsd_store::jobs::set_state(c, job_id, JobState::Pending, "job-queued")
    })
}

/// `Restart-Job`: only legal once the job has reached a terminal state.
pub fn restart_job(store: &Store, job_id: i64, username: &str, is_admin: bool) -> Result<()> {
    store.write(|c| {
        let job = cupsd_store::jobs::get(c, job_id)?;
        require_owner(&job, username, is_admin, false)?;
        if !job.state.is_terminal() {
            return Err(Error::NotPossible(format!("job {job_id} is still active")));
        }
        cupsd_store::jobs::set_state(c, job_id, JobState::Pending, "job-restart")
    })
}

/// `Cancel-Job`.
pub fn cancel_job(
    store: &Store,
    job_id: i64,
    username: &str,
    is_admin: bool,
    user_cancel_any: bool,
    purge_job: bool,
) -> Result<()> {
    store.write(|c| {
        let job = cupsd_store::jobs::get(c, job_id)?;
        require_owner(&job, username, is_admin, user_cancel_any)?;
        if job.state.is_terminal() && !purge_job {
            return Err(Error::NotPossible(format!("job {job_id} already completed")));
        }
        if !job.state.is_terminal() {
            cupsd_store::jobs::set_state(c, job_id, JobState::Canceled, "job-canceled-by-user")?;
        }
        Ok(())
    })
}

/// Which of a user's jobs `Cancel-My-Jobs`/`Cancel-Jobs` should touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhichJobs {
    Completed,
    NotCompleted,
    All,
}

impl WhichJobs {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("completed") => Self::Completed,
            Some("all") => Self::All,
            _ => Self::NotCompleted,
        }
    }

    fn matches(self, job: &Job) -> bool {
        match self {
            Self::Completed => job.state.is_terminal(),
            Self::NotCompleted => !job.state.is_terminal(),
            Self::All => true,
        }
    }
}

/// `Cancel-My-Jobs`: cancels every job the requester owns on a destination
/// (or globally when `printer_id` is `None`) that matches `which_jobs`.
pub fn cancel_my_jobs(
    store: &Store,
    printer_id: Option<i64>,
    username: &str,
    which_jobs: WhichJobs,
    purge: bool,
) -> Result<Vec<i64>> {
    store.write(|c| {
        let candidates = match printer_id {
            Some(pid) => cupsd_store::jobs::list_for_printer(c, pid)?,
            None => cupsd_store::jobs::list_for_user(c, username)?,
        };
        let mut cancelled = Vec::new();
        for job in candidates {
            if !job.user_name.eq_ignore_ascii_case(username) || !which_jobs.matches(&job) {
                continue;
            }
            if !job.state.is_terminal() {
                cupsd_store::jobs::set_state(c, job.id, JobState::Canceled, "job-canceled-by-user")?;
            } else if purge {
                cupsd_store::jobs::delete(c, job.id)?;
            }
            cancelled.push(job.id);
        }
        Ok(cancelled)
    })
}

/// `Cancel-Jobs`: cancels every job on a destination (admin-only per
/// `opcodes::is_admin_only`), or only the requester's when `my_jobs` is set.
pub fn cancel_jobs(store: &Store, printer_id: i64, my_jobs: bool, username: &str) -> Result<Vec<i64>> {
    store.write(|c| {
        let jobs = cupsd_store::jobs::list_for_printer(c, printer_id)?;
        let mut cancelled = Vec::new();
        for job in jobs {
            if my_jobs && !job.user_name.eq_ignore_ascii_case(username) {
                continue;
            }
            if !job.state.is_terminal() {
                cupsd_store::jobs::set_state(c, job.id, JobState::Canceled, "job-canceled-by-user")?;
                cancelled.push(job.id);
            }
        }
        Ok(cancelled)
    })
}

/// `Purge-Jobs`: deletes every job row on a destination; unlinks spool files
/// unless `preserve_job_files` is set.
pub fn purge_jobs(store: &Store, printer_id: i64, preserve_job_files: bool) -> Result<Vec<i64>> {
    let job_ids = store.write(|c| {
        if !preserve_job_files {
            for job in cupsd_store::jobs::list_for_printer(c, printer_id)? {
                for doc in cupsd_store::documents::list_for_job(c, job.id)? {
                    if let Some(path) = doc.path {
                        let _ = std::fs::remove_file(path);
                    }
                }
            }
        }
        cupsd_store::jobs::delete_for_printer(c, printer_id)
    })?;
    Ok(job_ids)
}

/// `CUPS-Move-Job`: rebinds a job's exclusive printer reference. A terminal
/// job cannot move; a class destination picks its first accepting member.
pub fn move_job(store: &Store, job_id: i64, target: &Destination) -> Result<()> {
    store.write(|c| {
        let job = cupsd_store::jobs::get(c, job_id)?;
        if job.state.is_terminal() {
            return Err(Error::NotPossible(format!("job {job_id} already completed")));
        }
        if !target.common().accepting {
            return Err(Error::NotAcceptingJobs(target.common().name.clone()));
        }
        let printer_id = match target {
            Destination::Printer(p) => p.common.id,
            Destination::Class(class) => destinations::pick_accepting_member_tx(c, class)?.common.id,
        };
        cupsd_store::jobs::set_printer(c, job_id, printer_id)
    })
}

/// `CUPS-Move-Job` without a `job-id`/`job-uri`: move-all-by-owner. `source`
/// is the resolved `printer-uri` destination (a single printer, or a class —
/// in which case every member's matching jobs fan out to `target`). When
/// `requesting_user` is set, only that user's non-terminal jobs move;
/// otherwise every non-terminal job on the source moves. Each moved job
/// rebinds only its `printer_id`, matching `move_job`'s single-job effect.
pub fn move_all(
    store: &Store,
    source: &Destination,
    target: &Destination,
    requesting_user: Option<&str>,
) -> Result<Vec<i64>> {
    store.write(|c| {
        if !target.common().accepting {
            return Err(Error::NotAcceptingJobs(target.common().name.clone()));
        }
        let target_printer_id = match target {
            Destination::Printer(p) => p.common.id,
            Destination::Class(class) => destinations::pick_accepting_member_tx(c, class)?.common.id,
        };

        let source_printer_ids: Vec<i64> = match source {
            Destination::Printer(p) => vec![p.common.id],
            Destination::Class(class) => class.members.clone(),
        };

        let mut moved = Vec::new();
        for printer_id in source_printer_ids {
            for job in cupsd_store::jobs::list_for_printer(c, printer_id)? {
                if job.state.is_terminal() {
                    continue;
                }
                if let Some(user) = requesting_user {
                    if !job.user_name.eq_ignore_ascii_case(user) {
                        continue;
                    }
                }
                cupsd_store::jobs::set_printer(c, job.id, target_printer_id)?;
                moved.push(job.id);
            }
        }
        Ok(moved)
    })
}

/// `Set-Job-Attributes`: merges option updates, re-validates the merged map,
/// and toggles the held/queued state when `job-hold-until` crosses the
/// no-hold boundary.
pub fn set_job_attributes(
    store: &Store,
    job_id: i64,
    username: &str,
    is_admin: bool,
    updates: HashMap<String, String>,
    caps: &Caps,
    ppd: Option<&ParsedPpd>,
) -> Result<()> {
    store.write(|c| {
        let job = cupsd_store::jobs::get(c, job_id)?;
        require_owner(&job, username, is_admin, false)?;

        let mut merged = job.options.clone();
        merged.extend(updates);
        ipp_options::validate(&merged, caps, ppd)?;

        let was_held = job.state == JobState::Held;
        let should_hold = holds(&merged);
        cupsd_store::jobs::set_options(c, job_id, &merged)?;
        if should_hold && !was_held && !job.state.is_terminal() {
            cupsd_store::jobs::set_state(c, job_id, JobState::Held, "job-held-by-user")?;
        } else if !should_hold && was_held {
            cupsd_store::jobs::set_state(c, job_id, JobState::Pending, "job-queued")?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cupsd_core::Printer;

    fn setup() -> (Store, Destination, Caps) {
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
                        default_options: &Default::default(),
                    },
                )
            })
            .unwrap();
        let printer = store.read(|c| cupsd_store::printers::get(c, id)).unwrap();
        (store, Destination::Printer(printer), Caps::default())
    }

    #[test]
    fn new_job_without_hold_is_pending() {
        let (store, dest, caps) = setup();
        let job = create_job(
            &store,
            &dest,
            NewJobRequest { user_name: "alice", job_name: "doc", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn new_job_with_hold_until_starts_held() {
        let (store, dest, caps) = setup();
        let mut options = HashMap::new();
        options.insert("job-hold-until".to_string(), "indefinite".to_string());
        let job = create_job(
            &store,
            &dest,
            NewJobRequest { user_name: "alice", job_name: "doc", options, document_format: None },
            &caps,
            None,
        )
        .unwrap();
        assert_eq!(job.state, JobState::Held);
    }

    #[test]
    fn cancel_completed_job_without_purge_is_not_possible() {
        let (store, dest, caps) = setup();
        let job = create_job(
            &store,
            &dest,
            NewJobRequest { user_name: "alice", job_name: "doc", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();
        store.write(|c| cupsd_store::jobs::set_state(c, job.id, JobState::Completed, "job-completed")).unwrap();
        let err = cancel_job(&store, job.id, "alice", false, false, false).unwrap_err();
        assert!(matches!(err, Error::NotPossible(_)));
    }

    #[test]
    fn non_owner_cannot_cancel_without_admin_or_user_cancel_any() {
        let (store, dest, caps) = setup();
        let job = create_job(
            &store,
            &dest,
            NewJobRequest { user_name: "alice", job_name: "doc", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();
        let err = cancel_job(&store, job.id, "bob", false, false, false).unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));
        cancel_job(&store, job.id, "bob", false, true, false).unwrap();
    }

    #[test]
    fn move_job_rejects_completed_job() {
        let (store, dest, caps) = setup();
        let job = create_job(
            &store,
            &dest,
            NewJobRequest { user_name: "alice", job_name: "doc", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();
        store.write(|c| cupsd_store::jobs::set_state(c, job.id, JobState::Completed, "job-completed")).unwrap();
        let other_id = store
            .write(|c| {
                cupsd_store::printers::insert(
                    c,
                    &cupsd_store::printers::NewPrinter {
                        name: "other",
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
        let other: Printer = store.read(|c| cupsd_store::printers::get(c, other_id)).unwrap();
        let err = move_job(&store, job.id, &Destination::Printer(other)).unwrap_err();
        assert!(matches!(err, Error::NotPossible(_)));
    }

    #[test]
    fn set_job_attributes_toggles_hold_state() {
        let (store, dest, caps) = setup();
        let job = create_job(
            &store,
            &dest,
            NewJobRequest { user_name: "alice", job_name: "doc", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();
        let mut updates = HashMap::new();
        updates.insert("job-hold-until".to_string(), "indefinite".to_string());
        set_job_attributes(&store, job.id, "alice", false, updates, &caps, None).unwrap();
        let job = store.read(|c| cupsd_store::jobs::get(c, job.id)).unwrap();
        assert_eq!(job.state, JobState::Held);

        let mut updates = HashMap::new();
        updates.insert("job-hold-until".to_string(), "no-hold".to_string());
        set_job_attributes(&store, job.id, "alice", false, updates, &caps, None).unwrap();
        let job = store.read(|c| cupsd_store::jobs::get(c, job.id)).unwrap();
        assert_eq!(job.state, JobState::Pending);
    }

    fn insert_printer(store: &Store, name: &str) -> i64 {
        store
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
            .unwrap()
    }

    #[test]
    fn move_all_with_owner_scope_only_moves_that_owners_jobs() {
        let store = Store::open_in_memory().unwrap();
        let source_id = insert_printer(&store, "Source");
        let dest_id = insert_printer(&store, "Destination");
        let source = Destination::Printer(store.read(|c| cupsd_store::printers::get(c, source_id)).unwrap());
        let dest = Destination::Printer(store.read(|c| cupsd_store::printers::get(c, dest_id)).unwrap());
        let caps = Caps::default();

        let alice_job = create_job(
            &store,
            &source,
            NewJobRequest { user_name: "alice", job_name: "a", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();
        let bob_job = create_job(
            &store,
            &source,
            NewJobRequest { user_name: "bob", job_name: "b", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();

        let moved = move_all(&store, &source, &dest, Some("alice")).unwrap();
        assert_eq!(moved, vec![alice_job.id]);

        let alice_job = store.read(|c| cupsd_store::jobs::get(c, alice_job.id)).unwrap();
        let bob_job = store.read(|c| cupsd_store::jobs::get(c, bob_job.id)).unwrap();
        assert_eq!(alice_job.printer_id, dest_id);
        assert_eq!(bob_job.printer_id, source_id);
    }

    #[test]
    fn move_all_from_class_fans_out_across_every_member() {
        let store = Store::open_in_memory().unwrap();
        let source_a = insert_printer(&store, "SourceA");
        let source_b = insert_printer(&store, "SourceB");
        let dest_id = insert_printer(&store, "Destination");
        let class_id = store.write(|c| cupsd_store::classes::insert(c, "Team", "", "", &[source_a, source_b])).unwrap();
        let class = store.read(|c| cupsd_store::classes::get(c, class_id)).unwrap();
        let dest = Destination::Printer(store.read(|c| cupsd_store::printers::get(c, dest_id)).unwrap());
        let caps = Caps::default();

        let job_a = create_job(
            &store,
            &Destination::Printer(store.read(|c| cupsd_store::printers::get(c, source_a)).unwrap()),
            NewJobRequest { user_name: "alice", job_name: "a", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();
        let job_b = create_job(
            &store,
            &Destination::Printer(store.read(|c| cupsd_store::printers::get(c, source_b)).unwrap()),
            NewJobRequest { user_name: "bob", job_name: "b", options: Default::default(), document_format: None },
            &caps,
            None,
        )
        .unwrap();

        let moved = move_all(&store, &Destination::Class(class), &dest, None).unwrap();
        assert_eq!(moved.len(), 2);
        assert!(moved.contains(&job_a.id));
        assert!(moved.contains(&job_b.id));

        let job_a = store.read(|c| cupsd_store::jobs::get(c, job_a.id)).unwrap();
        let job_b = store.read(|c| cupsd_store::jobs::get(c, job_b.id)).unwrap();
        assert_eq!(job_a.printer_id, dest_id);
        assert_eq!(job_b.printer_id, dest_id);
    }
}
