// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use vchannel_dispatch::{
    cfg::enums::ChannelKind,
    channel::{client::ChannelClient, pipe_item::{PipeItem, SmartcardMigrateItem}},
    smartcard::{migrate::parse_migrate_blob, reader_table::ReaderTable},
};

use crate::integration_tests::common::{FakeCharDevice, RecordingStream};

/// A bridge's partial-read state survives a full marshal-over-the-wire and
/// parse-back cycle: the same shape `ChannelClient::send_item` emits for a
/// live migration handoff.
#[tokio::test]
async fn bridge_snapshot_survives_wire_round_trip() {
    let readers = Arc::new(ReaderTable::new(10));
    let bridge = readers
        .add_reader(FakeCharDevice::with_chunks(vec![]), 282)
        .expect("add_reader failed");
    bridge.handle_migrate_data(true, &[0xDE, 0xAD, 0xBE, 0xEF, 0x01]);

    let snapshot = bridge.migrate_snapshot();

    let (stream, written) = RecordingStream::new();
    let client = ChannelClient::new(1, ChannelKind::Smartcard, 0, true, Box::new(stream));
    client
        .send_item(PipeItem::SmartcardMigrateData(SmartcardMigrateItem {
            reader_added: snapshot.reader_added,
            buf: snapshot.buf.clone(),
        }))
        .await
        .expect("send failed");

    let bytes = written.lock().expect("poisoned").clone();
    let parsed = parse_migrate_blob(&bytes).expect("parse failed");
    assert_eq!(parsed.reader_added, snapshot.reader_added);
    assert_eq!(parsed.buf, snapshot.buf);

    let fresh = readers
        .add_reader(FakeCharDevice::with_chunks(vec![]), 282)
        .expect("add_reader failed");
    fresh.handle_migrate_data(parsed.reader_added, &parsed.buf);
    let restored = fresh.migrate_snapshot();

    assert_eq!(restored.reader_added, snapshot.reader_added);
    assert_eq!(restored.buf, snapshot.buf);
}

/// A channel that isn't migratable refuses migrate-data items even when
/// the bridge behind it has a perfectly valid snapshot to offer.
#[tokio::test]
async fn non_migratable_client_rejects_migrate_data() {
    let readers = Arc::new(ReaderTable::new(10));
    let bridge = readers
        .add_reader(FakeCharDevice::with_chunks(vec![]), 282)
        .expect("add_reader failed");
    bridge.handle_migrate_data(false, &[]);
    let snapshot = bridge.migrate_snapshot();

    let (stream, written) = RecordingStream::new();
    let client = ChannelClient::new(1, ChannelKind::Smartcard, 0, false, Box::new(stream));
    let result = client
        .send_item(PipeItem::SmartcardMigrateData(SmartcardMigrateItem {
            reader_added: snapshot.reader_added,
            buf: snapshot.buf,
        }))
        .await;

    assert!(result.is_err());
    assert!(written.lock().expect("poisoned").is_empty());
}
