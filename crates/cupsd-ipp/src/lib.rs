// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// cupsd-ipp — the IPP/1.1 (+ CUPS extensions) wire protocol: the binary
// attribute codec, a minimal PPD capability source, capability synthesis,
// and job-option translation/validation. No network I/O lives here; that's
// `cupsd-dispatch`'s job.

pub mod capabilities;
pub mod codec;
pub mod options;
pub mod ppd;

pub use capabilities::Caps;
pub use codec::{decode, encode, Attribute, Group, Message, Value};
pub use ppd::ParsedPpd;
