// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The character-device bridge's read-side state machine:
//! `Idle -> AwaitingHeader -> AwaitingBody -> MessageReady -> Idle`, with
//! `Idle -> Idle` on a spurious EOF or would-block. Modeled the same way as
//! [`crate::state_machine::primary_surface`]: a plain state enum plus an
//! `apply` transition function returning [`Transition`], driven directly by
//! [`crate::smartcard::bridge::CharDeviceBridge`] rather than through the
//! boxed-future [`StateMachine`](crate::state_machine::common::StateMachine)
//! trait — there is no awaited I/O here, just bookkeeping over a buffer that
//! a non-blocking read already filled or didn't.

use tracing::warn;

use crate::state_machine::common::Transition;

/// Current phase of the next inbound message's assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeReadState {
    #[default]
    Idle,
    AwaitingHeader,
    AwaitingBody {
        length: u32,
    },
    MessageReady,
}

/// Events produced by a non-blocking read attempt or by the caller consuming
/// a completed message.
#[derive(Debug, Clone, Copy)]
pub enum BridgeReadEvent {
    /// The device read returned `0` or `WouldBlock`: end the current cycle,
    /// retaining whatever partial state exists.
    WouldBlockOrEof,
    /// Enough bytes are now buffered to parse a complete header.
    HeaderComplete { length: u32 },
    /// Enough bytes are now buffered to satisfy the header's declared
    /// `length`.
    BodyComplete,
    /// The caller has taken ownership of the completed message and the
    /// trailing bytes (if any) have been shifted to the front of the buffer.
    Consumed,
}

impl BridgeReadState {
    pub fn apply(self, event: BridgeReadEvent) -> Transition<Self, ()> {
        use BridgeReadEvent as E;
        use BridgeReadState as S;

        match (self, event) {
            (S::Idle, E::WouldBlockOrEof) => Transition::Stay(()),
            (S::Idle, E::HeaderComplete { length }) => {
                Transition::Next(S::AwaitingBody { length }, ())
            },
            (S::AwaitingHeader, E::WouldBlockOrEof) => Transition::Stay(()),
            (S::AwaitingHeader, E::HeaderComplete { length }) => {
                Transition::Next(S::AwaitingBody { length }, ())
            },
            (S::AwaitingBody { .. }, E::WouldBlockOrEof) => Transition::Stay(()),
            (S::AwaitingBody { .. }, E::BodyComplete) => Transition::Next(S::MessageReady, ()),
            (S::MessageReady, E::Consumed) => Transition::Next(S::Idle, ()),
            (state, event) => {
                warn!(?state, ?event, "unexpected bridge-read transition, ignoring");
                Transition::Stay(())
            },
        }
    }

    /// Begins a fresh assembly cycle after a short read left fewer than a
    /// full header buffered.
    pub fn begin_header(self) -> Self {
        match self {
            Self::Idle => Self::AwaitingHeader,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let s = BridgeReadState::Idle.begin_header();
        assert_eq!(s, BridgeReadState::AwaitingHeader);

        let Transition::Next(s, ()) = s.apply(BridgeReadEvent::HeaderComplete { length: 4 })
        else {
            panic!("expected Next");
        };
        assert_eq!(s, BridgeReadState::AwaitingBody { length: 4 });

        let Transition::Next(s, ()) = s.apply(BridgeReadEvent::BodyComplete) else {
            panic!("expected Next");
        };
        assert_eq!(s, BridgeReadState::MessageReady);

        let Transition::Next(s, ()) = s.apply(BridgeReadEvent::Consumed) else {
            panic!("expected Next");
        };
        assert_eq!(s, BridgeReadState::Idle);
    }

    #[test]
    fn would_block_retains_partial_state() {
        let s = BridgeReadState::AwaitingBody { length: 100 };
        let Transition::Stay(()) = s.apply(BridgeReadEvent::WouldBlockOrEof) else {
            panic!("expected Stay");
        };
        assert_eq!(s, BridgeReadState::AwaitingBody { length: 100 });
    }

    #[test]
    fn spurious_eof_on_idle_is_a_noop() {
        let s = BridgeReadState::Idle;
        let Transition::Stay(()) = s.apply(BridgeReadEvent::WouldBlockOrEof) else {
            panic!("expected Stay");
        };
        assert_eq!(s, BridgeReadState::Idle);
    }
}
