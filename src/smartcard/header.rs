// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The smartcard wire header (`VscHeader`): `[type, reader_id,
//! length]`, three big-endian `u32`s, twelve bytes total, followed
//! immediately by `length` payload bytes.
//!
//! Per the endianness design note: the logical [`VscHeader`] is held
//! in host order everywhere in memory; [`VscHeader::to_wire`] and
//! [`VscHeader::from_wire`] are the only places a byte swap happens, each
//! producing a fresh value rather than swapping in place.

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32};

/// Size of the fixed header on the wire.
pub const HEADER_LEN: usize = 12;

/// Maximum APDU payload a reader is expected to produce in one message
/// . The initial read buffer is sized to fit exactly one header plus
/// one maximum-size APDU; larger messages (e.g. `LoadvmCommands`-style
/// bulk transfers) grow the buffer by doubling.
pub const MAX_APDU_PAYLOAD: usize = 270;

/// Sanity bound on a header's declared `length`, rejected as malformed
/// above this. Generous relative to
/// `MAX_APDU_PAYLOAD` so legitimate bulk messages (e.g. ATR blobs) still
/// fit, while a corrupt length field can't force an unbounded allocation.
pub const MAX_SANE_LENGTH: u32 = 1 << 20;

/// Distinguished message types . The remaining type space is opaque
/// APDU traffic the bridge passes through untouched.
pub const VSC_MSG_INIT: u32 = 0;
pub const VSC_MSG_ERROR: u32 = 1;
pub const VSC_MSG_READER_ADD: u32 = 2;
pub const VSC_MSG_READER_REMOVE: u32 = 3;
pub const VSC_MSG_ATR: u32 = 4;
pub const VSC_MSG_APDU: u32 = 5;
pub const VSC_MSG_FLUSH: u32 = 6;

/// The on-wire layout: three big-endian `u32`s, no padding.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct WireHeader {
    msg_type: U32<BigEndian>,
    reader_id: U32<BigEndian>,
    length: U32<BigEndian>,
}

/// The logical, host-order header every in-memory component reads and
/// writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VscHeader {
    pub msg_type: u32,
    pub reader_id: u32,
    pub length: u32,
}

impl VscHeader {
    pub const fn new(msg_type: u32, reader_id: u32, length: u32) -> Self {
        Self {
            msg_type,
            reader_id,
            length,
        }
    }

    /// Parses a wire-order header out of the first [`HEADER_LEN`] bytes.
    pub fn from_wire(bytes: &[u8; HEADER_LEN]) -> Self {
        let wire = WireHeader::ref_from_bytes(bytes.as_slice())
            .expect("WireHeader is a fixed 12-byte POD layout");
        Self {
            msg_type: wire.msg_type.get(),
            reader_id: wire.reader_id.get(),
            length: wire.length.get(),
        }
    }

    /// Produces the wire-order byte representation.
    pub fn to_wire(&self) -> [u8; HEADER_LEN] {
        let wire = WireHeader {
            msg_type: U32::new(self.msg_type),
            reader_id: U32::new(self.reader_id),
            length: U32::new(self.length),
        };
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(wire.as_bytes());
        out
    }

    pub const fn is_init(&self) -> bool {
        self.msg_type == VSC_MSG_INIT
    }
}
