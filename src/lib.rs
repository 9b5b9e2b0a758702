// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server-side channel and dispatch fabric for a remote-desktop guest-device
//! server: a cross-task command dispatcher with both fire-and-forget and
//! cookie-matched completion semantics, and a character-device channel
//! (smartcard reader) that multiplexes a length-prefixed protocol stream
//! between a host device and a remote client, with live-migration support.

pub mod cfg;
pub mod channel;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod smartcard;
pub mod state_machine;
pub mod utils;
