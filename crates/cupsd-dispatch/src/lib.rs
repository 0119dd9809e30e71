// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// cupsd-dispatch — destination resolution, the job/queue state machine,
// subscriptions/notifications, and the IPP operation dispatcher binding
// the rest of the workspace together.

pub mod destinations;
pub mod dispatcher;
pub mod jobs;
pub mod opcodes;
pub mod printers;
pub mod subscriptions;

pub use dispatcher::{dispatch, DispatchContext};
