// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The async-command registry (A): tracks in-flight commands that require
//! an eventual completion callback to the submitter, keyed by an opaque
//! 64-bit cookie.

use dashmap::DashMap;
use tracing::warn;

use crate::dispatch::queue::MessageTag;

/// One allocated, in-flight async command.
///
/// Lifetime: created at submission of any message whose tag is in the async
/// set; owned by the registry until the worker reports completion, then
/// handed to the device's `async_complete` callback and dropped.
#[derive(Debug, Clone, Copy)]
pub struct AsyncCommand {
    pub tag: MessageTag,
    pub cookie: u64,
}

/// Cookie-keyed table of in-flight async commands for one device dispatcher.
///
/// `append`-style inserts from the submitter, single removal from the
/// completion path; `DashMap` gives us that without a separate lock for this
/// high-churn, independent-key access pattern.
#[derive(Debug, Default)]
pub struct AsyncCommandRegistry {
    inflight: DashMap<u64, MessageTag>,
}

impl AsyncCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly submitted async command.
    pub fn submit(&self, cmd: AsyncCommand) {
        self.inflight.insert(cmd.cookie, cmd.tag);
    }

    /// Resolves a worker completion for `cookie`, removing the record and
    /// returning the tag it was submitted under.
    ///
    /// Per the forward-progress guarantee, a missing cookie is logged but
    /// does not prevent the caller from still invoking the guest callback.
    pub fn complete(&self, cookie: u64) -> Option<MessageTag> {
        match self.inflight.remove(&cookie) {
            Some((_, tag)) => Some(tag),
            None => {
                warn!(cookie, "async completion for unregistered cookie");
                None
            },
        }
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}
