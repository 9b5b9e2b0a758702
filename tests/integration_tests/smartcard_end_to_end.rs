// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use vchannel_dispatch::{
    cfg::enums::ChannelKind,
    channel::{
        channel::{Channel, ChannelCapabilities, MigrateMode},
        handlers::SmartcardConnectHandler,
    },
    smartcard::{
        header::{HEADER_LEN, VSC_MSG_APDU, VSC_MSG_READER_ADD, VscHeader},
        reader_table::ReaderTable,
    },
};

use crate::integration_tests::common::{FakeCharDevice, RecordingStream};

fn message(msg_type: u32, reader_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = VscHeader::new(msg_type, reader_id, payload.len() as u32);
    let mut bytes = header.to_wire().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

fn chunk(bytes: &[u8], sizes: &[usize]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    for &size in sizes {
        out.push(bytes[pos..pos + size].to_vec());
        pos += size;
    }
    assert_eq!(pos, bytes.len());
    out
}

/// A client connects to the smartcard channel, is auto-attached to the
/// first free reader, and a chunked device read reaches the client's
/// stream as a fully reassembled wire message with the reader id patched
/// to the bridge's assigned id.
#[tokio::test]
async fn connect_attaches_and_delivers_reassembled_message() {
    let wire = message(VSC_MSG_APDU, 0, b"hello-card");
    let chunks = chunk(&wire, &[3, 5, 8, 6]);
    let device = FakeCharDevice::with_chunks(chunks);

    let readers = Arc::new(ReaderTable::new(10));
    let bridge = readers.add_reader(device.clone(), 282).expect("add_reader failed");

    let handler = SmartcardConnectHandler::new(readers.clone());
    let channel = Channel::new(
        ChannelKind::Smartcard,
        0,
        ChannelCapabilities::MIGRATION | ChannelCapabilities::ACK_WINDOW,
        MigrateMode::Enabled,
        Box::new(handler),
    );

    let (stream, written) = RecordingStream::new();
    let client = channel
        .accept(Box::new(stream), 1, ChannelCapabilities::MIGRATION)
        .expect("accept failed");

    assert_eq!(client.ack_window(), 0);
    assert_eq!(readers.reader_for_client(1), Some(bridge.reader_id));
    // ReaderAdd is sent synchronously on attach, before any device traffic.
    assert_eq!(&device.writes.lock().expect("poisoned")[0][0..4], &VSC_MSG_READER_ADD.to_be_bytes());

    // Drain every attached bridge's pending device traffic into client pipes.
    let results = readers.poll_all();
    assert!(results.iter().all(|(_, r)| r.is_ok()));

    client.flush().await.expect("flush failed");

    let got = written.lock().expect("poisoned").clone();
    let expected = message(VSC_MSG_APDU, bridge.reader_id, b"hello-card");
    assert_eq!(got, expected);

    channel.disconnect(client.id);
    assert_eq!(readers.reader_for_client(1), None);
    assert_eq!(channel.client_count(), 0);
}

/// When no reader is free, connect succeeds but the client stays
/// unattached; a later reader registration doesn't retroactively attach
/// it (attach only happens at connect time).
#[tokio::test]
async fn connect_with_no_readers_leaves_client_unattached() {
    let readers = Arc::new(ReaderTable::new(10));
    let handler = SmartcardConnectHandler::new(readers.clone());
    let channel = Channel::new(
        ChannelKind::Smartcard,
        1,
        ChannelCapabilities::empty(),
        MigrateMode::Disabled,
        Box::new(handler),
    );

    let (stream, _written) = RecordingStream::new();
    let client = channel
        .accept(Box::new(stream), 2, ChannelCapabilities::empty())
        .expect("accept failed");

    assert_eq!(readers.reader_for_client(client.id), None);
}

#[test]
fn header_len_matches_wire_layout() {
    assert_eq!(HEADER_LEN, 12);
}
