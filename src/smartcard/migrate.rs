// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The smartcard channel's migration blob: magic + version
//! header followed by `{reader_added: u8, buf_used: u32, buf[buf_used]}`.
//! [`crate::channel::client::ChannelClient`] marshals the outbound shape;
//! this module owns the constants and the inbound parse used when a newly
//! connected client hands over migration data from its previous host.

use crate::error::SmartcardError;

/// Arbitrary but fixed magic identifying a smartcard migration blob.
pub const SMARTCARD_MIGRATE_MAGIC: u32 = 0x5343_4d44; // "SCMD"
pub const SMARTCARD_MIGRATE_VERSION: u32 = 1;

/// A parsed smartcard migration payload, ready to hand to
/// [`crate::smartcard::bridge::CharDeviceBridge::handle_migrate_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartcardMigrateData {
    pub reader_added: bool,
    pub buf: Vec<u8>,
}

/// Parses the `{magic, version, reader_added, buf_used, buf}` blob this
/// channel emits from [`crate::channel::client::ChannelClient::send_item`].
/// A mismatched magic/version or a truncated buffer is a protocol error.
pub fn parse_migrate_blob(bytes: &[u8]) -> Result<SmartcardMigrateData, SmartcardError> {
    const PREFIX: usize = 4 + 4 + 1 + 4;
    if bytes.len() < PREFIX {
        return Err(SmartcardError::MalformedHeader(bytes.len() as u32));
    }
    let magic = u32::from_be_bytes(bytes[0..4].try_into().expect("checked length"));
    let version = u32::from_be_bytes(bytes[4..8].try_into().expect("checked length"));
    if magic != SMARTCARD_MIGRATE_MAGIC || version != SMARTCARD_MIGRATE_VERSION {
        return Err(SmartcardError::MalformedHeader(magic));
    }
    let reader_added = bytes[8] != 0;
    let buf_used = u32::from_be_bytes(bytes[9..13].try_into().expect("checked length")) as usize;
    let buf = bytes.get(13..13 + buf_used).ok_or(SmartcardError::MalformedHeader(buf_used as u32))?;
    Ok(SmartcardMigrateData {
        reader_added,
        buf: buf.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marshal(reader_added: bool, buf: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SMARTCARD_MIGRATE_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&SMARTCARD_MIGRATE_VERSION.to_be_bytes());
        bytes.push(u8::from(reader_added));
        bytes.extend_from_slice(&(buf.len() as u32).to_be_bytes());
        bytes.extend_from_slice(buf);
        bytes
    }

    #[test]
    fn parses_well_formed_blob() {
        let bytes = marshal(true, &[1, 2, 3, 4]);
        let parsed = parse_migrate_blob(&bytes).expect("parse failed");
        assert!(parsed.reader_added);
        assert_eq!(parsed.buf, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = marshal(false, &[]);
        bytes[0] ^= 0xff;
        assert!(parse_migrate_blob(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_buffer() {
        let mut bytes = marshal(false, &[1, 2, 3]);
        bytes.truncate(bytes.len() - 1);
        assert!(parse_migrate_blob(&bytes).is_err());
    }
}
