// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cross-task command dispatch: the typed queue between a device's
//! submitter call site and its worker task, and the bookkeeping that matches
//! worker completions back to cookies the guest is waiting on.

pub mod async_command;
pub mod queue;

pub use async_command::{AsyncCommand, AsyncCommandRegistry};
pub use queue::{DispatchQueue, Envelope, MessageTag, Payload};
