// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Operation-id constants (RFC 8011 §4, PWG5100.11/18, plus the CUPS private
// extension range starting at 0x4001). The dispatcher's `route` match arm
// list is the canonical reference for which of these this daemon implements.

pub const PRINT_JOB: u16 = 0x0002;
pub const VALIDATE_JOB: u16 = 0x0004;
pub const CREATE_JOB: u16 = 0x0005;
pub const SEND_DOCUMENT: u16 = 0x0006;
pub const CANCEL_JOB: u16 = 0x0008;
pub const GET_JOB_ATTRIBUTES: u16 = 0x0009;
pub const GET_JOBS: u16 = 0x000a;
pub const GET_PRINTER_ATTRIBUTES: u16 = 0x000b;
pub const HOLD_JOB: u16 = 0x000c;
pub const RELEASE_JOB: u16 = 0x000d;
pub const RESTART_JOB: u16 = 0x000e;
pub const PAUSE_PRINTER: u16 = 0x0010;
pub const RESUME_PRINTER: u16 = 0x0011;
pub const PURGE_JOBS: u16 = 0x0012;
pub const SET_JOB_ATTRIBUTES: u16 = 0x0014;
pub const GET_PRINTER_SUPPORTED_VALUES: u16 = 0x0015;
pub const CREATE_PRINTER_SUBSCRIPTIONS: u16 = 0x0016;
pub const CREATE_JOB_SUBSCRIPTIONS: u16 = 0x0017;
pub const GET_SUBSCRIPTION_ATTRIBUTES: u16 = 0x0018;
pub const GET_SUBSCRIPTIONS: u16 = 0x0019;
pub const RENEW_SUBSCRIPTION: u16 = 0x001a;
pub const CANCEL_SUBSCRIPTION: u16 = 0x001b;
pub const GET_NOTIFICATIONS: u16 = 0x001c;
pub const ENABLE_PRINTER: u16 = 0x0022;
pub const DISABLE_PRINTER: u16 = 0x0023;
pub const HOLD_NEW_JOBS: u16 = 0x0025;
pub const RELEASE_HELD_NEW_JOBS: u16 = 0x0026;
pub const RESTART_PRINTER: u16 = 0x0029;
pub const RESUME_JOB: u16 = 0x002f;
pub const CLOSE_JOB: u16 = 0x003b;

// Internal-only extensions with no PWG-assigned code; allocated out of the
// same private block CUPS uses for its own extensions.
pub const VALIDATE_DOCUMENT: u16 = 0x4030;
pub const GET_DOCUMENTS: u16 = 0x4031;
pub const GET_DOCUMENT_ATTRIBUTES: u16 = 0x4032;
pub const CANCEL_MY_JOBS: u16 = 0x4033;
pub const CANCEL_JOBS: u16 = 0x4034;
pub const PAUSE_ALL_PRINTERS: u16 = 0x4035;
pub const RESUME_ALL_PRINTERS: u16 = 0x4036;
pub const RESTART_SYSTEM: u16 = 0x4037;

// CUPS extensions (real assigned values, cups/ipp.h `cups_op_t`).
pub const CUPS_GET_DEFAULT: u16 = 0x4001;
pub const CUPS_GET_PRINTERS: u16 = 0x4002;
pub const CUPS_ADD_MODIFY_PRINTER: u16 = 0x4003;
pub const CUPS_DELETE_PRINTER: u16 = 0x4004;
pub const CUPS_GET_CLASSES: u16 = 0x4005;
pub const CUPS_ADD_MODIFY_CLASS: u16 = 0x4006;
pub const CUPS_DELETE_CLASS: u16 = 0x4007;
pub const CUPS_ACCEPT_JOBS: u16 = 0x4008;
pub const CUPS_REJECT_JOBS: u16 = 0x4009;
pub const CUPS_SET_DEFAULT: u16 = 0x400a;
pub const CUPS_GET_DEVICES: u16 = 0x400b;
pub const CUPS_GET_PPDS: u16 = 0x400c;
pub const CUPS_MOVE_JOB: u16 = 0x400d;
pub const CUPS_GET_PPD: u16 = 0x400f;
pub const CUPS_GET_DOCUMENT: u16 = 0x4027;

/// The admin-only mutating set ("the full CUPS mutating set
/// enumerated in the auth module"). Everything here requires an
/// authenticated admin identity regardless of `<Limit>` configuration.
pub const ADMIN_ONLY: &[u16] = &[
    PAUSE_PRINTER,
    RESUME_PRINTER,
    PURGE_JOBS,
    ENABLE_PRINTER,
    DISABLE_PRINTER,
    HOLD_NEW_JOBS,
    RELEASE_HELD_NEW_JOBS,
    RESTART_PRINTER,
    CANCEL_JOBS,
    PAUSE_ALL_PRINTERS,
    RESUME_ALL_PRINTERS,
    RESTART_SYSTEM,
    CUPS_ADD_MODIFY_PRINTER,
    CUPS_DELETE_PRINTER,
    CUPS_ADD_MODIFY_CLASS,
    CUPS_DELETE_CLASS,
    CUPS_ACCEPT_JOBS,
    CUPS_REJECT_JOBS,
    CUPS_SET_DEFAULT,
    CUPS_MOVE_JOB,
];

pub fn is_admin_only(op: u16) -> bool {
    ADMIN_ONLY.contains(&op)
}

/// IPP status codes this crate encodes directly (RFC 8011 §13.1); the bulk
/// of the taxonomy lives on `cupsd_core::error::Error::ipp_status`.
pub mod status {
    pub const SUCCESSFUL_OK: u16 = 0x0000;
    pub const SUCCESSFUL_OK_IGNORED_OR_SUBSTITUTED: u16 = 0x0001;
    pub const SUCCESSFUL_OK_EVENTS_COMPLETE: u16 = 0x0002;
}
