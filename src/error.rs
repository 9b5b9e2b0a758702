// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed error enums for every module of the dispatch/channel fabric.
//!
//! Each enum covers one of the failure kinds from the error-handling design:
//! programmer errors (fatal, logged and the component torn down), resource
//! errors (logged, operation aborted, component stays recoverable), protocol
//! errors (disconnect the offending channel client), and peer errors (retry
//! on next readable event). Binaries and integration glue convert these into
//! `anyhow::Result` at the boundary.

use thiserror::Error;

/// Errors surfaced by the dispatcher queue and device dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker task has already stopped; the queue's receiving half was
    /// dropped.
    #[error("dispatch queue closed: worker is gone")]
    QueueClosed,
    /// A sync send's completion acknowledgement was dropped before the
    /// worker replied.
    #[error("sync dispatch call lost its completion ack")]
    AckLost,
    /// `gl_draw_async` called with no prior `gl_scanout`.
    #[error("gl_draw_async requires a prior gl_scanout")]
    NoScanout,
    /// `gl_draw_async` called while a previous draw is still in flight.
    #[error("gl_draw_async already in flight")]
    GlDrawInFlight,
    /// `set_max_monitors` called with a value below the floor of 1.
    #[error("max_monitors must be >= 1, got {0}")]
    InvalidMaxMonitors(u32),
    /// An `async_complete` callback arrived for a cookie the registry never
    /// allocated (forward-progress guarantee: the cookie is still delivered
    /// to the guest, this variant only documents why it was logged).
    #[error("async completion for unregistered cookie {0:#x}")]
    UnknownCookie(u64),
}

/// Errors surfaced by the channel and channel-client layer.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A second channel registered for an already-occupied `(kind, id)`.
    #[error("channel ({kind}, {id}) is already registered")]
    DuplicateChannel { kind: &'static str, id: u32 },
    /// No channel registered for the given `(kind, id)`.
    #[error("no channel registered for ({kind}, {id})")]
    UnknownChannel { kind: &'static str, id: u32 },
    /// `send_item` received a pipe item tag the channel does not recognize.
    /// Fatal: the client is disconnected rather than the process panicking.
    #[error("unrecognized pipe item for channel client, disconnecting")]
    UnrecognizedPipeItem,
    /// The channel does not support migration but a migrate-data item was
    /// pushed anyway.
    #[error("channel is not migratable")]
    NotMigratable,
    /// The underlying client stream failed.
    #[error("client stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the smartcard character-device bridge.
#[derive(Debug, Error)]
pub enum SmartcardError {
    /// Attach attempted on a bridge that already has a client, or a client
    /// that already has a bridge.
    #[error("double attach: bridge or client already attached")]
    DoubleAttach,
    /// A header declared a `length` the sanity check rejects (protocol
    /// error: disconnect the offending client).
    #[error("malformed header: declared length {0} exceeds sanity bound")]
    MalformedHeader(u32),
    /// No reader slots remain in the global readers table.
    #[error("reader table is full (max {0} readers)")]
    ReaderTableFull(u32),
    /// `WriteBuffer` allocation failed for a reader-add/remove notification.
    /// Non-fatal: the bridge remains attached without the notification
    /// having been sent.
    #[error("write buffer allocation failed: {0}")]
    AllocationFailed(String),
    /// The host character device returned an I/O error.
    #[error("char device I/O error: {0}")]
    Io(#[from] std::io::Error),
}
