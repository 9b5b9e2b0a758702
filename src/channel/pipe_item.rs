// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The tagged union of outbound pipe items a [`crate::channel::client::ChannelClient`]
//! can carry . Owned end-to-end: a pipe-push moves the item in, a
//! wire-send consumes it — there is no second reference to keep alive across
//! marshalling.

use crate::smartcard::header::VscHeader;

/// A smartcard protocol message, already translated to the client-facing
/// `reader_id`, on its way to the wire.
#[derive(Debug, Clone)]
pub struct SmartcardMsgItem {
    pub header: VscHeader,
    pub payload: Vec<u8>,
}

/// The smartcard bridge's migration snapshot, submarshalled as
/// `{reader_added: u8, buf_used: u32, buf[buf_used]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartcardMigrateItem {
    pub reader_added: bool,
    pub buf: Vec<u8>,
}

/// A server-generated error report, sent in place of whatever the client was
/// waiting on (e.g. a disconnect reason).
#[derive(Debug, Clone)]
pub struct ErrorItem {
    pub message: String,
}

/// Every shape that can sit in a `ChannelClient`'s outbound pipe.
///
/// Closed by design: the tag already determines how
/// `send_item` marshals the item, so there is no runtime "unknown shape"
/// case to handle for the variants this crate implements. `ChannelError::
/// UnrecognizedPipeItem` remains for a future channel kind (display/cursor/
/// inputs) extending this enum without every existing match arm knowing
/// about it.
#[derive(Debug, Clone)]
pub enum PipeItem {
    Error(ErrorItem),
    SmartcardData(SmartcardMsgItem),
    SmartcardMigrateData(SmartcardMigrateItem),
}
