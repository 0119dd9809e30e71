// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The IPP operation dispatcher. Binds the wire codec and this crate's own
// destination/job/subscription modules together: resolves the destination,
// enforces the admin-only gate, routes to a per-operation handler, and
// encodes the IPP response. HTTP-level policy/auth preflight runs upstream
// of this module; by the time `dispatch` is called the caller already
// knows the effective identity.

use std::collections::HashMap;

use cupsd_core::error::{Error, Result};
use cupsd_core::{Destination, Job, Printer, PrinterState, SubscriptionOwner};
use cupsd_ipp::capabilities::Caps;
use cupsd_ipp::codec::{group_tag, Group, Message, Value};
use cupsd_ipp::options as ipp_options;
use cupsd_ipp::ppd::ParsedPpd;
use cupsd_store::Store;

use crate::{destinations, jobs, opcodes, printers, subscriptions};

/// Everything a request needs beyond the decoded IPP message: the already-
/// authenticated identity and the daemon's configured paths/policy knobs.
pub struct DispatchContext<'a> {
    pub store: &'a Store,
    pub username: &'a str,
    pub is_admin: bool,
    pub user_cancel_any: bool,
    pub preserve_job_files: bool,
    pub spool_dir: &'a str,
    pub ppd_dir: &'a str,
    /// The HTTP request path, used as the fallback for destination
    /// resolution when `printer-uri` is absent from the operation group.
    pub request_path: &'a str,
}

/// Decodes nothing itself — `request` is already the output of
/// `cupsd_ipp::codec::decode`; `document_bytes` is that call's trailing byte
/// slice, non-empty only for `Print-Job`/`Send-Document`.
pub fn dispatch(ctx: &DispatchContext, request: &Message, document_bytes: &[u8]) -> Message {
    match route(ctx, request, document_bytes) {
        Ok(response) => response,
        Err(err) => error_response(&err, request.request_id),
    }
}

fn error_response(err: &Error, request_id: u32) -> Message {
    let mut response = Message::new_response(err.ipp_status(), request_id);
    response.group_mut(group_tag::OPERATION).set(
        "status-message",
        Value::TextWithoutLanguage(err.to_string()),
    );
    response
}

fn route(ctx: &DispatchContext, request: &Message, document_bytes: &[u8]) -> Result<Message> {
    if opcodes::is_admin_only(request.code) && !ctx.is_admin {
        return Err(Error::NotAuthorized("this operation requires an administrator".to_string()));
    }

    use opcodes::*;
    match request.code {
        PRINT_JOB => handle_create_job(ctx, request, Some(document_bytes)),
        CREATE_JOB => handle_create_job(ctx, request, None),
        SEND_DOCUMENT => handle_send_document(ctx, request, document_bytes),
        VALIDATE_JOB | VALIDATE_DOCUMENT => handle_validate_job(ctx, request),
        CANCEL_JOB => handle_cancel_job(ctx, request, false),
        GET_JOB_ATTRIBUTES => handle_get_job_attributes(ctx, request),
        GET_JOBS => handle_get_jobs(ctx, request),
        GET_PRINTER_ATTRIBUTES => handle_get_printer_attributes(ctx, request),
        GET_PRINTER_SUPPORTED_VALUES => handle_get_printer_supported_values(ctx, request),
        HOLD_JOB => handle_job_op(ctx, request, jobs::hold_job),
        RELEASE_JOB | RESUME_JOB => handle_job_op(ctx, request, jobs::release_job),
        RESTART_JOB => handle_job_op(ctx, request, jobs::restart_job),
        CLOSE_JOB => handle_job_op(ctx, request, jobs::close_job),
        PAUSE_PRINTER => handle_printer_toggle(ctx, request, printers::pause),
        RESUME_PRINTER => handle_printer_toggle(ctx, request, printers::resume),
        ENABLE_PRINTER => handle_printer_toggle(ctx, request, printers::enable),
        DISABLE_PRINTER => handle_printer_toggle(ctx, request, printers::disable),
        HOLD_NEW_JOBS => handle_printer_toggle(ctx, request, printers::hold_new_jobs),
        RELEASE_HELD_NEW_JOBS => handle_printer_toggle(ctx, request, printers::release_held_new_jobs),
        RESTART_PRINTER => handle_printer_toggle(ctx, request, printers::restart),
        CUPS_ACCEPT_JOBS => handle_printer_toggle(ctx, request, printers::enable),
        CUPS_REJECT_JOBS => handle_printer_toggle(ctx, request, printers::disable),
        PAUSE_ALL_PRINTERS => handle_bulk_state(ctx, request, PrinterState::Stopped),
        RESUME_ALL_PRINTERS | RESTART_SYSTEM => handle_bulk_state(ctx, request, PrinterState::Idle),
        PURGE_JOBS => handle_purge_jobs(ctx, request),
        CANCEL_JOBS => handle_cancel_jobs(ctx, request, false),
        CANCEL_MY_JOBS => handle_cancel_jobs(ctx, request, true),
        SET_JOB_ATTRIBUTES => handle_set_job_attributes(ctx, request),
        CUPS_MOVE_JOB => handle_move_job(ctx, request),
        CUPS_GET_DEFAULT => handle_get_default(ctx, request),
        CUPS_GET_PRINTERS => handle_get_printers(ctx, request),
        CUPS_GET_CLASSES => handle_get_classes(ctx, request),
        CUPS_ADD_MODIFY_PRINTER => handle_add_modify_printer(ctx, request),
        CUPS_ADD_MODIFY_CLASS => handle_add_modify_class(ctx, request),
        CUPS_DELETE_PRINTER => handle_delete_destination(ctx, request, true),
        CUPS_DELETE_CLASS => handle_delete_destination(ctx, request, false),
        CUPS_SET_DEFAULT => handle_set_default(ctx, request),
        CUPS_GET_DEVICES => Ok(Message::new_response(opcodes::status::SUCCESSFUL_OK, request.request_id)),
        CUPS_GET_PPDS => handle_get_ppds(ctx, request),
        CUPS_GET_PPD => handle_get_ppd(ctx, request),
        GET_DOCUMENTS | GET_DOCUMENT_ATTRIBUTES | CUPS_GET_DOCUMENT => handle_get_documents(ctx, request),
        CREATE_PRINTER_SUBSCRIPTIONS | CREATE_JOB_SUBSCRIPTIONS => handle_create_subscription(ctx, request),
        GET_SUBSCRIPTION_ATTRIBUTES => handle_get_subscription(ctx, request),
        GET_SUBSCRIPTIONS => handle_get_subscriptions(ctx, request),
        RENEW_SUBSCRIPTION => handle_renew_subscription(ctx, request),
        CANCEL_SUBSCRIPTION => handle_cancel_subscription(ctx, request),
        GET_NOTIFICATIONS => handle_get_notifications(ctx, request),
        other => Err(Error::BadRequest(format!("unsupported operation 0x{other:04x}"))),
    }
}

// ---------------------------------------------------------------------------
// Request-attribute helpers
// ---------------------------------------------------------------------------

fn op_group(msg: &Message) -> Result<&Group> {
    msg.operation_attrs().ok_or_else(|| Error::BadRequest("missing operation attributes group".to_string()))
}

/// `requesting-user-name` is authoritative for ownership tracking
/// independent of the HTTP-authenticated identity (CUPS's own convention
/// when `auth-type none` is configured); falls back to the identity the
/// authenticator already resolved.
fn acting_user<'a>(ctx: &'a DispatchContext, op: &'a Group) -> &'a str {
    op.get_str("requesting-user-name").unwrap_or(ctx.username)
}

fn resolve_job_id(op: &Group) -> Result<i64> {
    if let Some(id) = op.get_int("job-id") {
        return Ok(id as i64);
    }
    if let Some(uri) = op.get_str("job-uri") {
        return uri
            .rsplit('/')
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::BadRequest(format!("invalid job-uri '{uri}'")));
    }
    Err(Error::BadRequest("missing job-id/job-uri".to_string()))
}

fn resolve_request_destination(ctx: &DispatchContext, op: &Group) -> Result<Destination> {
    destinations::resolve_destination(ctx.store, op.get_str("printer-uri"), ctx.request_path)
}

fn caps_for(ctx: &DispatchContext, printer: Option<&Printer>, default_options: &HashMap<String, String>) -> (Caps, Option<ParsedPpd>) {
    let ppd = printer
        .and_then(|p| p.ppd_name.as_deref())
        .and_then(|name| ParsedPpd::load(&format!("{}/{}", ctx.ppd_dir, name)).ok());
    let caps = Caps::synthesize(ppd.as_ref(), default_options);
    (caps, ppd)
}

fn caps_for_destination(ctx: &DispatchContext, dest: &Destination) -> (Caps, Option<ParsedPpd>) {
    match dest {
        Destination::Printer(p) => caps_for(ctx, Some(p), &p.common.default_options),
        Destination::Class(c) => caps_for(ctx, None, &c.common.default_options),
    }
}

// ---------------------------------------------------------------------------
// Response-attribute helpers
// ---------------------------------------------------------------------------

fn ok_response(request_id: u32) -> Message {
    Message::new_response(opcodes::status::SUCCESSFUL_OK, request_id)
}

fn job_group(job: &Job, dest: &Destination) -> Group {
    let mut g = Group { tag: group_tag::JOB, attributes: Vec::new() };
    g.set("job-id", Value::Integer(job.id as i32));
    g.set("job-uri", Value::Uri(format!("ipp://localhost/jobs/{}", job.id)));
    g.set("job-printer-uri", Value::Uri(format!("ipp://localhost{}", dest.uri_path())));
    g.set("job-state", Value::Enum(job.state.as_i32()));
    g.set_many("job-state-reasons", vec![Value::Keyword(job.state_reason.clone())]);
    g.set("job-name", Value::NameWithoutLanguage(job.name.clone()));
    g.set("job-originating-user-name", Value::NameWithoutLanguage(job.user_name.clone()));
    g.set("job-impressions-completed", Value::Integer(job.impressions as i32));
    g
}

fn printer_group(dest: &Destination, caps: &Caps) -> Group {
    let common = dest.common();
    let mut g = Group { tag: group_tag::PRINTER, attributes: Vec::new() };
    g.set("printer-name", Value::NameWithoutLanguage(common.name.clone()));
    g.set("printer-uri-supported", Value::Uri(format!("ipp://localhost{}", dest.uri_path())));
    g.set("printer-state", Value::Enum(common.state as i32));
    g.set_many("printer-state-reasons", vec![Value::Keyword("none".to_string())]);
    g.set("printer-is-accepting-jobs", Value::Boolean(common.accepting));
    g.set("printer-info", Value::TextWithoutLanguage(common.info.clone()));
    g.set("printer-location", Value::TextWithoutLanguage(common.location.clone()));
    g.set("printer-organization", Value::TextWithoutLanguage(common.org.clone()));
    g.set("printer-organizational-unit", Value::TextWithoutLanguage(common.org_unit.clone()));
    g.set("printer-is-shared", Value::Boolean(common.shared));
    g.set("document-format-default", Value::MimeMediaType("application/octet-stream".to_string()));
    g.set_many(
        "document-format-supported",
        caps.document_format_supported.iter().cloned().map(Value::MimeMediaType).collect(),
    );
    g.set_many("media-supported", caps.media_supported.iter().cloned().map(Value::Keyword).collect());
    g.set_many("sides-supported", caps.sides.iter().cloned().map(Value::Keyword).collect());
    g.set_many(
        "print-color-mode-supported",
        caps.color_modes.iter().cloned().map(Value::Keyword).collect(),
    );
    g.set_many("urf-supported", caps.urf_supported().into_iter().map(Value::Keyword).collect());
    g.set("color-supported", Value::Boolean(caps.supports_color()));
    g
}

// ---------------------------------------------------------------------------
// Print-Job / Create-Job / Send-Document / Validate-Job
// ---------------------------------------------------------------------------

fn handle_create_job(ctx: &DispatchContext, request: &Message, document_bytes: Option<&[u8]>) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    let (caps, ppd) = caps_for_destination(ctx, &dest);

    let mut options = request.job_attrs().map(|g| ipp_options::collect(std::slice::from_ref(g))).unwrap_or_default();
    options.extend(ipp_options::collect(std::slice::from_ref(op)));

    let job_name = op.get_str("job-name").unwrap_or("untitled").to_string();
    let document_format = op.get_str("document-format");
    let user = acting_user(ctx, op).to_string();

    let job = jobs::create_job(
        ctx.store,
        &dest,
        jobs::NewJobRequest { user_name: &user, job_name: &job_name, options, document_format },
        &caps,
        ppd.as_ref(),
    )?;

    if let Some(bytes) = document_bytes {
        if !bytes.is_empty() {
            let file_name = op.get_str("document-name").unwrap_or("document");
            let mime = document_format.unwrap_or("application/octet-stream");
            jobs::spool_document(ctx.store, ctx.spool_dir, job.id, file_name, mime, bytes)?;
        }
    }

    let mut response = ok_response(request.request_id);
    response.groups.push(job_group(&job, &dest));
    Ok(response)
}

fn handle_send_document(ctx: &DispatchContext, request: &Message, document_bytes: &[u8]) -> Result<Message> {
    let op = op_group(request)?;
    let job_id = resolve_job_id(op)?;
    let job = ctx.store.read(|c| cupsd_store::jobs::get(c, job_id))?;
    let user = acting_user(ctx, op).to_string();
    if !ctx.is_admin && !job.user_name.eq_ignore_ascii_case(&user) {
        return Err(Error::NotAuthorized(format!("job {job_id} is not owned by {user}")));
    }
    let file_name = op.get_str("document-name").unwrap_or("document");
    let mime = op.get_str("document-format").unwrap_or("application/octet-stream");
    if !document_bytes.is_empty() {
        jobs::spool_document(ctx.store, ctx.spool_dir, job_id, file_name, mime, document_bytes)?;
    }
    let last = op.get_bool("last-document").unwrap_or(true);
    if last {
        jobs::close_job(ctx.store, job_id, &user, ctx.is_admin)?;
    }
    let dest = ctx.store.read(|c| cupsd_store::printers::get(c, job.printer_id)).map(Destination::Printer)?;
    let job = ctx.store.read(|c| cupsd_store::jobs::get(c, job_id))?;
    let mut response = ok_response(request.request_id);
    response.groups.push(job_group(&job, &dest));
    Ok(response)
}

fn handle_validate_job(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    let (caps, ppd) = caps_for_destination(ctx, &dest);
    let mut options = request.job_attrs().map(|g| ipp_options::collect(std::slice::from_ref(g))).unwrap_or_default();
    options.extend(ipp_options::collect(std::slice::from_ref(op)));
    ipp_options::validate(&options, &caps, ppd.as_ref())?;
    if let Some(format) = op.get_str("document-format") {
        if format != "application/octet-stream" && !caps.document_format_supported.iter().any(|f| f == format) {
            return Err(Error::DocumentFormatNotSupported(format.to_string()));
        }
    }
    Ok(ok_response(request.request_id))
}

// ---------------------------------------------------------------------------
// Job lifecycle (Hold/Release/Restart/Close/Cancel)
// ---------------------------------------------------------------------------

fn handle_job_op(
    ctx: &DispatchContext,
    request: &Message,
    op_fn: impl FnOnce(&Store, i64, &str, bool) -> Result<()>,
) -> Result<Message> {
    let op = op_group(request)?;
    let job_id = resolve_job_id(op)?;
    op_fn(ctx.store, job_id, acting_user(ctx, op), ctx.is_admin)?;
    Ok(ok_response(request.request_id))
}

fn handle_cancel_job(ctx: &DispatchContext, request: &Message, _unused: bool) -> Result<Message> {
    let op = op_group(request)?;
    let job_id = resolve_job_id(op)?;
    let purge = op.get_bool("purge-job").unwrap_or(false);
    jobs::cancel_job(ctx.store, job_id, acting_user(ctx, op), ctx.is_admin, ctx.user_cancel_any, purge)?;
    Ok(ok_response(request.request_id))
}

fn handle_get_job_attributes(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let job_id = resolve_job_id(op)?;
    let job = ctx.store.read(|c| cupsd_store::jobs::get(c, job_id))?;
    let dest = ctx.store.read(|c| cupsd_store::printers::get(c, job.printer_id)).map(Destination::Printer)?;
    let mut response = ok_response(request.request_id);
    response.groups.push(job_group(&job, &dest));
    Ok(response)
}

fn handle_get_jobs(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let which = jobs::WhichJobs::parse(op.get_str("which-jobs"));
    let my_jobs = op.get_bool("my-jobs").unwrap_or(false);
    let user = acting_user(ctx, op).to_string();

    let jobs_list: Vec<Job> = if let Some(uri) = op.get_str("printer-uri") {
        let dest = destinations::resolve_destination(ctx.store, Some(uri), ctx.request_path)?;
        ctx.store.read(|c| cupsd_store::jobs::list_for_printer(c, dest.common().id))?
    } else {
        ctx.store.read(|c| cupsd_store::jobs::list_all(c))?
    };

    let mut response = ok_response(request.request_id);
    for job in jobs_list {
        if my_jobs && !job.user_name.eq_ignore_ascii_case(&user) {
            continue;
        }
        let matches = match which {
            jobs::WhichJobs::Completed => job.state.is_terminal(),
            jobs::WhichJobs::NotCompleted => !job.state.is_terminal(),
            jobs::WhichJobs::All => true,
        };
        if !matches {
            continue;
        }
        let dest = ctx.store.read(|c| cupsd_store::printers::get(c, job.printer_id)).map(Destination::Printer)?;
        response.groups.push(job_group(&job, &dest));
    }
    Ok(response)
}

fn handle_set_job_attributes(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let job_id = resolve_job_id(op)?;
    let job = ctx.store.read(|c| cupsd_store::jobs::get(c, job_id))?;
    let dest = ctx.store.read(|c| cupsd_store::printers::get(c, job.printer_id)).map(Destination::Printer)?;
    let (caps, ppd) = caps_for_destination(ctx, &dest);
    let updates = request.job_attrs().map(|g| ipp_options::collect(std::slice::from_ref(g))).unwrap_or_default();
    jobs::set_job_attributes(ctx.store, job_id, acting_user(ctx, op), ctx.is_admin, updates, &caps, ppd.as_ref())?;
    Ok(ok_response(request.request_id))
}

fn handle_purge_jobs(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    jobs::purge_jobs(ctx.store, dest.common().id, ctx.preserve_job_files)?;
    Ok(ok_response(request.request_id))
}

fn handle_cancel_jobs(ctx: &DispatchContext, request: &Message, my_jobs_op: bool) -> Result<Message> {
    let op = op_group(request)?;
    let user = acting_user(ctx, op).to_string();
    if my_jobs_op {
        let which = jobs::WhichJobs::parse(op.get_str("which-jobs"));
        let purge = op.get_bool("purge-jobs").unwrap_or(false);
        let printer_id = match op.get_str("printer-uri") {
            Some(uri) => Some(destinations::resolve_destination(ctx.store, Some(uri), ctx.request_path)?.common().id),
            None => None,
        };
        jobs::cancel_my_jobs(ctx.store, printer_id, &user, which, purge)?;
    } else {
        let dest = resolve_request_destination(ctx, op)?;
        let my_jobs = op.get_bool("my-jobs").unwrap_or(false);
        jobs::cancel_jobs(ctx.store, dest.common().id, my_jobs, &user)?;
    }
    Ok(ok_response(request.request_id))
}

/// `CUPS-Move-Job`: a present `job-id`/non-zero `job-uri` moves one job;
/// otherwise move-all-by-owner fans out across the resolved source.
fn handle_move_job(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let target_uri = op
        .get_str("job-printer-uri")
        .ok_or_else(|| Error::BadRequest("missing job-printer-uri".to_string()))?;
    let target = destinations::resolve_destination(ctx.store, Some(target_uri), "")?;

    let has_job_ref = op.get_int("job-id").is_some() || op.get_str("job-uri").is_some();
    if has_job_ref {
        let job_id = resolve_job_id(op)?;
        jobs::move_job(ctx.store, job_id, &target)?;
    } else {
        let source = resolve_request_destination(ctx, op)?;
        let requesting_user = op.get_str("requesting-user-name");
        jobs::move_all(ctx.store, &source, &target, requesting_user)?;
    }
    Ok(ok_response(request.request_id))
}

// ---------------------------------------------------------------------------
// Printer/class state toggles
// ---------------------------------------------------------------------------

fn handle_printer_toggle(
    ctx: &DispatchContext,
    request: &Message,
    toggle: impl FnOnce(&Store, &Destination) -> Result<()>,
) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    toggle(ctx.store, &dest)?;
    Ok(ok_response(request.request_id))
}

fn handle_bulk_state(ctx: &DispatchContext, request: &Message, state: PrinterState) -> Result<Message> {
    printers::set_all_state(ctx.store, state)?;
    Ok(ok_response(request.request_id))
}

// ---------------------------------------------------------------------------
// Get-Printer-Attributes / Get-Printer-Supported-Values
// ---------------------------------------------------------------------------

fn handle_get_printer_attributes(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    let (caps, _ppd) = caps_for_destination(ctx, &dest);
    let mut response = ok_response(request.request_id);
    response.groups.push(printer_group(&dest, &caps));
    Ok(response)
}

fn handle_get_printer_supported_values(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    handle_get_printer_attributes(ctx, request)
}

fn handle_get_default(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let dest = destinations::resolve_destination(ctx.store, None, ctx.request_path)?;
    let (caps, _ppd) = caps_for_destination(ctx, &dest);
    let mut response = ok_response(request.request_id);
    response.groups.push(printer_group(&dest, &caps));
    Ok(response)
}

fn handle_get_printers(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let printers_list = ctx.store.read(|c| cupsd_store::printers::list(c))?;
    let mut response = ok_response(request.request_id);
    for printer in printers_list {
        let dest = Destination::Printer(printer);
        let (caps, _ppd) = caps_for_destination(ctx, &dest);
        response.groups.push(printer_group(&dest, &caps));
    }
    Ok(response)
}

fn handle_get_classes(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let classes_list = ctx.store.read(|c| cupsd_store::classes::list(c))?;
    let mut response = ok_response(request.request_id);
    for class in classes_list {
        let dest = Destination::Class(class);
        let (caps, _ppd) = caps_for_destination(ctx, &dest);
        response.groups.push(printer_group(&dest, &caps));
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// CUPS-Add-Modify-Printer/Class, CUPS-Delete-Printer/Class, CUPS-Set-Default
// ---------------------------------------------------------------------------

fn handle_add_modify_printer(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let printer_attrs = request.printer_attrs();
    let name = op
        .get_str("printer-uri")
        .and_then(|uri| uri.rsplit('/').next())
        .ok_or_else(|| Error::BadRequest("missing printer-uri".to_string()))?;
    let device_uri = printer_attrs.and_then(|g| g.get_str("device-uri")).unwrap_or("file:///dev/null");
    let ppd_name = printer_attrs.and_then(|g| g.get_str("ppd-name"));
    let info = printer_attrs.and_then(|g| g.get_str("printer-info")).unwrap_or("");
    let location = printer_attrs.and_then(|g| g.get_str("printer-location")).unwrap_or("");
    let geo = printer_attrs.and_then(|g| g.get_str("printer-geo-location")).unwrap_or("");
    let org = printer_attrs.and_then(|g| g.get_str("printer-organization")).unwrap_or("");
    let org_unit = printer_attrs.and_then(|g| g.get_str("printer-organizational-unit")).unwrap_or("");
    let shared = printer_attrs.and_then(|g| g.get_bool("printer-is-shared")).unwrap_or(true);
    let options = printer_attrs.map(|g| ipp_options::collect(std::slice::from_ref(g))).unwrap_or_default();

    let printer = printers::add_modify_printer(
        ctx.store,
        &printers::PrinterUpdate {
            name,
            device_uri,
            ppd_name,
            info,
            location,
            geo,
            org,
            org_unit,
            shared,
            default_options: &options,
        },
    )?;
    let mut response = ok_response(request.request_id);
    response.groups.push(printer_group(&Destination::Printer(printer), &Caps::default()));
    Ok(response)
}

fn handle_add_modify_class(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let printer_attrs = request.printer_attrs();
    let name = op
        .get_str("printer-uri")
        .and_then(|uri| uri.rsplit('/').next())
        .ok_or_else(|| Error::BadRequest("missing printer-uri".to_string()))?;
    let info = printer_attrs.and_then(|g| g.get_str("printer-info")).unwrap_or("");
    let location = printer_attrs.and_then(|g| g.get_str("printer-location")).unwrap_or("");
    let shared = printer_attrs.and_then(|g| g.get_bool("printer-is-shared")).unwrap_or(true);
    let options = printer_attrs.map(|g| ipp_options::collect(std::slice::from_ref(g))).unwrap_or_default();
    let member_uris = printer_attrs.map(|g| g.get_strs("member-uris")).unwrap_or_default();

    let mut member_ids = Vec::with_capacity(member_uris.len());
    for uri in &member_uris {
        let member_name = uri.rsplit('/').next().unwrap_or("");
        let member = ctx.store.read(|c| cupsd_store::printers::get_by_name(c, member_name))?;
        member_ids.push(member.common.id);
    }

    let class = printers::add_modify_class(ctx.store, name, info, location, shared, &options, &member_ids)?;
    let mut response = ok_response(request.request_id);
    response.groups.push(printer_group(&Destination::Class(class), &Caps::default()));
    Ok(response)
}

fn handle_delete_destination(ctx: &DispatchContext, request: &Message, is_printer: bool) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    if is_printer {
        printers::delete_printer(ctx.store, dest.common().id)?;
    } else {
        printers::delete_class(ctx.store, dest.common().id)?;
    }
    Ok(ok_response(request.request_id))
}

fn handle_set_default(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    printers::set_default(ctx.store, &dest)?;
    Ok(ok_response(request.request_id))
}

// ---------------------------------------------------------------------------
// PPD / document retrieval (thin: real filter pipeline is an external
// collaborator)
// ---------------------------------------------------------------------------

fn handle_get_ppds(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let mut response = ok_response(request.request_id);
    let entries = std::fs::read_dir(ctx.ppd_dir).map_err(Error::Io)?;
    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            let mut g = Group { tag: group_tag::PRINTER, attributes: Vec::new() };
            g.set("ppd-name", Value::NameWithoutLanguage(name.to_string()));
            response.groups.push(g);
        }
    }
    Ok(response)
}

fn handle_get_ppd(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let dest = resolve_request_destination(ctx, op)?;
    let ppd_name = match &dest {
        Destination::Printer(p) => p.ppd_name.clone(),
        Destination::Class(_) => None,
    };
    let ppd_name = ppd_name.ok_or_else(|| Error::NotFound(format!("{} has no PPD", dest.common().name)))?;
    let path = format!("{}/{}", ctx.ppd_dir, ppd_name);
    std::fs::metadata(&path).map_err(Error::Io)?;
    Ok(ok_response(request.request_id))
}

fn handle_get_documents(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let job_id = resolve_job_id(op)?;
    let docs = ctx.store.read(|c| cupsd_store::documents::list_for_job(c, job_id))?;
    let mut response = ok_response(request.request_id);
    for doc in docs {
        let mut g = Group { tag: group_tag::JOB, attributes: Vec::new() };
        g.set("document-number", Value::Integer(doc.number as i32));
        g.set("document-name", Value::NameWithoutLanguage(doc.file_name.clone()));
        g.set("document-format", Value::MimeMediaType(doc.mime_type.clone()));
        g.set("impressions", Value::Integer(0));
        response.groups.push(g);
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Subscriptions & notifications
// ---------------------------------------------------------------------------

fn subscription_group(sub: &cupsd_core::Subscription) -> Group {
    let mut g = Group { tag: group_tag::SUBSCRIPTION, attributes: Vec::new() };
    g.set("notify-subscription-id", Value::Integer(sub.id as i32));
    match sub.owner {
        SubscriptionOwner::Printer(id) => g.set("notify-printer-uri", Value::Uri(format!("ipp://localhost/printers-by-id/{id}"))),
        SubscriptionOwner::Job(id) => g.set("notify-job-id", Value::Integer(id as i32)),
    }
    g.set_many("notify-events", sub.events.iter().cloned().map(Value::Keyword).collect());
    g.set("notify-lease-duration", Value::Integer(sub.lease_secs as i32));
    g.set("notify-time-interval", Value::Integer(sub.time_interval as i32));
    g
}

fn handle_create_subscription(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let user = acting_user(ctx, op).to_string();
    let owner = if let Some(job_uri) = op.get_str("job-uri") {
        let job_id = job_uri
            .rsplit('/')
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::BadRequest(format!("invalid job-uri '{job_uri}'")))?;
        SubscriptionOwner::Job(job_id)
    } else {
        let dest = resolve_request_destination(ctx, op)?;
        SubscriptionOwner::Printer(dest.common().id)
    };

    let events = op.get_strs("notify-events");
    let lease_secs = op.get_int("notify-lease-duration").unwrap_or(0).max(0) as u32;
    let recipient_uri = op.get_str("notify-recipient-uri");
    let pull_method = op.get_str("notify-pull-method");
    let time_interval = op.get_int("notify-time-interval").unwrap_or(0).max(0) as u32;
    let user_data = op
        .get("notify-user-data")
        .and_then(|a| a.first())
        .and_then(|v| match v {
            Value::OctetString(b) => Some(b.clone()),
            _ => None,
        })
        .unwrap_or_default();

    let sub = subscriptions::create(
        ctx.store,
        subscriptions::NewSubscriptionRequest {
            owner,
            events,
            lease_secs,
            recipient_uri,
            pull_method,
            time_interval,
            user: &user,
            user_data,
        },
    )?;
    let mut response = ok_response(request.request_id);
    response.groups.push(subscription_group(&sub));
    Ok(response)
}

fn resolve_subscription_id(op: &Group) -> Result<i64> {
    op.get_int("notify-subscription-id")
        .map(|v| v as i64)
        .ok_or_else(|| Error::BadRequest("missing notify-subscription-id".to_string()))
}

fn handle_get_subscription(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let id = resolve_subscription_id(op)?;
    let sub = subscriptions::get(ctx.store, id, acting_user(ctx, op), ctx.is_admin)?;
    let mut response = ok_response(request.request_id);
    response.groups.push(subscription_group(&sub));
    Ok(response)
}

fn handle_get_subscriptions(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let user = acting_user(ctx, op).to_string();
    let my_subscriptions = op.get_bool("my-subscriptions").unwrap_or(true);
    let subs = subscriptions::list(ctx.store, &user, ctx.is_admin, my_subscriptions)?;
    let mut response = ok_response(request.request_id);
    for sub in subs {
        response.groups.push(subscription_group(&sub));
    }
    Ok(response)
}

fn handle_renew_subscription(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let id = resolve_subscription_id(op)?;
    let lease_secs = op.get_int("notify-lease-duration").unwrap_or(0).max(0) as u32;
    subscriptions::renew(ctx.store, id, acting_user(ctx, op), ctx.is_admin, lease_secs)?;
    Ok(ok_response(request.request_id))
}

fn handle_cancel_subscription(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let id = resolve_subscription_id(op)?;
    subscriptions::cancel(ctx.store, id, acting_user(ctx, op), ctx.is_admin)?;
    Ok(ok_response(request.request_id))
}

fn handle_get_notifications(ctx: &DispatchContext, request: &Message) -> Result<Message> {
    let op = op_group(request)?;
    let ids: Vec<i64> = {
        let explicit = op.get_strs("notify-subscription-ids");
        if !explicit.is_empty() {
            explicit.iter().filter_map(|s| s.parse().ok()).collect()
        } else {
            vec![resolve_subscription_id(op)?]
        }
    };
    let min_seq = op.get_int("notify-sequence-numbers").unwrap_or(1).max(1) as i64;
    let limit = op.get_int("notify-limit").unwrap_or(0).max(0) as u32;
    let user = acting_user(ctx, op).to_string();

    let mut response = ok_response(request.request_id);
    let mut any_events_complete = false;
    let mut min_interval = u32::MAX;
    for id in ids {
        let page = subscriptions::get_notifications(ctx.store, id, &user, ctx.is_admin, min_seq, limit)?;
        any_events_complete |= page.events_complete;
        min_interval = min_interval.min(page.get_interval);
        for notification in page.notifications {
            let mut g = Group { tag: group_tag::EVENT_NOTIFICATION, attributes: Vec::new() };
            g.set("notify-subscription-id", Value::Integer(id as i32));
            g.set("notify-sequence-number", Value::Integer(notification.sequence_number as i32));
            g.set("notify-subscribed-event", Value::Keyword(notification.event.clone()));
            response.groups.push(g);
        }
    }
    if min_interval == u32::MAX {
        min_interval = 60;
    }
    response
        .group_mut(group_tag::OPERATION)
        .set("notify-get-interval", Value::Integer(min_interval as i32));
    if any_events_complete {
        response.code = opcodes::status::SUCCESSFUL_OK_EVENTS_COMPLETE;
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cupsd_store::Store;

    use super::*;

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
                        default_options: &HashMap::new(),
                    },
                )
            })
            .unwrap()
    }

    fn ctx(store: &Store, username: &str, is_admin: bool) -> DispatchContext<'_> {
        DispatchContext {
            store,
            username,
            is_admin,
            user_cancel_any: false,
            preserve_job_files: true,
            spool_dir: "/tmp",
            ppd_dir: "/tmp",
            request_path: "/ipp/print",
        }
    }

    fn request(op: u16, printer_uri: Option<&str>) -> Message {
        let mut req = Message::new_request(op, 1);
        let mut group = Group { tag: group_tag::OPERATION, attributes: Vec::new() };
        if let Some(uri) = printer_uri {
            group.set("printer-uri", Value::Uri(uri.to_string()));
        }
        req.groups.push(group);
        req
    }

    /// S3 — `CUPS-Move-Job` (or any job operation) with an unparseable
    /// `job-uri` fails with `client-error-bad-request`, never a panic.
    #[test]
    fn invalid_job_uri_is_bad_request() {
        let store = Store::open_in_memory().unwrap();
        insert_printer(&store, "Source");
        let mut req = request(opcodes::CANCEL_JOB, Some("ipp://localhost/printers/Source"));
        req.groups[0].set("job-uri", Value::Uri("ipp://h/not-a-job-uri".to_string()));
        let response = dispatch(&ctx(&store, "alice", false), &req, &[]);
        assert_eq!(response.code, Error::BadRequest(String::new()).ipp_status());
    }

    /// End-to-end Print-Job then Get-Job-Attributes through `dispatch`: a
    /// full request round trip exercising the codec, destination resolver,
    /// and job creation together, not just the individual module.
    #[test]
    fn print_job_then_get_job_attributes_round_trips() {
        let store = Store::open_in_memory().unwrap();
        insert_printer(&store, "Office");
        let context = ctx(&store, "alice", false);

        let print_req = request(opcodes::PRINT_JOB, Some("ipp://localhost/printers/Office"));
        let print_response = dispatch(&context, &print_req, b"hello world");
        assert_eq!(print_response.code, opcodes::status::SUCCESSFUL_OK);
        let job_id = print_response.job_attrs().and_then(|g| g.get_int("job-id")).expect("job-id in response");

        let mut get_req = request(opcodes::GET_JOB_ATTRIBUTES, Some("ipp://localhost/printers/Office"));
        get_req.groups[0].set("job-id", Value::Integer(job_id));
        let get_response = dispatch(&context, &get_req, &[]);
        assert_eq!(get_response.code, opcodes::status::SUCCESSFUL_OK);
        assert_eq!(
            get_response.job_attrs().and_then(|g| g.get_str("job-originating-user-name")),
            Some("alice")
        );
    }

    /// S4/S5 — cancelling a completed job fails with `not-possible` unless
    /// `purge-job` is set, in which case it is removed outright.
    #[test]
    fn cancel_completed_job_requires_purge() {
        let store = Store::open_in_memory().unwrap();
        insert_printer(&store, "Office");
        let context = ctx(&store, "alice", false);

        let print_req = request(opcodes::PRINT_JOB, Some("ipp://localhost/printers/Office"));
        let print_response = dispatch(&context, &print_req, b"doc");
        let job_id = print_response.job_attrs().and_then(|g| g.get_int("job-id")).unwrap();
        store
            .write(|c| cupsd_store::jobs::set_state(c, job_id as i64, cupsd_core::JobState::Completed, "job-completed"))
            .unwrap();

        let mut cancel_req = request(opcodes::CANCEL_JOB, Some("ipp://localhost/printers/Office"));
        cancel_req.groups[0].set("job-id", Value::Integer(job_id));
        let response = dispatch(&context, &cancel_req, &[]);
        assert_eq!(response.code, Error::NotPossible(String::new()).ipp_status());

        let mut purge_req = request(opcodes::CANCEL_JOB, Some("ipp://localhost/printers/Office"));
        purge_req.groups[0].set("job-id", Value::Integer(job_id));
        purge_req.groups[0].set("purge-job", Value::Boolean(true));
        let response = dispatch(&context, &purge_req, &[]);
        assert_eq!(response.code, opcodes::status::SUCCESSFUL_OK);
        assert!(store.read(|c| cupsd_store::jobs::get(c, job_id as i64)).is_err());
    }

    /// Admin-only operations reject a non-admin identity before routing.
    #[test]
    fn admin_only_operation_rejects_non_admin() {
        let store = Store::open_in_memory().unwrap();
        let req = request(opcodes::PAUSE_PRINTER, Some("ipp://localhost/printers/whatever"));
        let response = dispatch(&ctx(&store, "alice", false), &req, &[]);
        assert_eq!(response.code, Error::NotAuthorized(String::new()).ipp_status());
    }
}
