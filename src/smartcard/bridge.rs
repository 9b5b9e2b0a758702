// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The character-device bridge: ties a host smartcard reader
//! character device to a channel. Reads length-prefixed messages from the
//! device, buffers partial reads across non-blocking poll cycles,
//! dispatches completed messages as pipe items to the attached client, and
//! writes client-to-device messages through the device's write queue.

use std::sync::{Arc, Mutex};

use tracing::{instrument, warn};

use crate::{
    channel::{client::ChannelClientHandle, pipe_item::SmartcardMsgItem},
    error::SmartcardError,
    smartcard::{
        device::CharDevice,
        header::{HEADER_LEN, MAX_SANE_LENGTH, VSC_MSG_READER_ADD, VSC_MSG_READER_REMOVE, VscHeader},
        write_buffer::WriteBuffer,
    },
    state_machine::bridge_read::{BridgeReadEvent, BridgeReadState},
};

struct BridgeInner {
    buf: Vec<u8>,
    buf_used: usize,
    read_state: BridgeReadState,
    attached_client: Option<ChannelClientHandle>,
    reader_added: bool,
}

/// One smartcard reader's bridge to the device.
///
/// `reader_id` is assigned once by the global readers table at
/// construction and never changes (monotonic, per the data model).
pub struct CharDeviceBridge {
    pub reader_id: u32,
    device: Arc<dyn CharDevice>,
    inner: Mutex<BridgeInner>,
}

impl CharDeviceBridge {
    pub(crate) fn new(reader_id: u32, device: Arc<dyn CharDevice>, initial_buf_size: usize) -> Self {
        Self {
            reader_id,
            device,
            inner: Mutex::new(BridgeInner {
                buf: vec![0u8; initial_buf_size.max(HEADER_LEN)],
                buf_used: 0,
                read_state: BridgeReadState::Idle,
                attached_client: None,
                reader_added: false,
            }),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().expect("bridge mutex poisoned").attached_client.is_some()
    }

    pub fn attached_client(&self) -> Option<ChannelClientHandle> {
        self.inner.lock().expect("bridge mutex poisoned").attached_client.clone()
    }

    /// Attaches `client` to this bridge: at most one client per bridge.
    /// Flips the device active and, on success, sends a `ReaderAdd`
    /// notification.
    ///
    /// Per-client uniqueness (the other half of the attach invariant) is
    /// enforced by the caller, [`crate::smartcard::reader_table::ReaderTable::attach`],
    /// which tracks attached client ids across every bridge.
    pub(crate) fn attach_client(&self, client: ChannelClientHandle) -> Result<(), SmartcardError> {
        {
            let mut inner = self.inner.lock().expect("bridge mutex poisoned");
            if inner.attached_client.is_some() {
                return Err(SmartcardError::DoubleAttach);
            }
            inner.attached_client = Some(client);
        }
        self.device.set_active(true);
        self.send_reader_add();
        Ok(())
    }

    /// Detaches the current client, if any, sending `ReaderRemove` iff a
    /// `ReaderAdd` was actually delivered (idempotent on a second detach).
    pub(crate) fn detach_client(&self) -> Option<ChannelClientHandle> {
        let (client, reader_added) = {
            let mut inner = self.inner.lock().expect("bridge mutex poisoned");
            let client = inner.attached_client.take()?;
            (client, inner.reader_added)
        };
        self.device.set_active(false);
        if reader_added {
            self.send_reader_remove();
        }
        Some(client)
    }

    #[instrument(skip(self))]
    fn send_reader_add(&self) {
        match self.write_control_message(VSC_MSG_READER_ADD) {
            Ok(()) => {
                self.inner.lock().expect("bridge mutex poisoned").reader_added = true;
            },
            Err(e) => {
                warn!(reader_id = self.reader_id, error = %e, "reader-add notification failed");
            },
        }
    }

    #[instrument(skip(self))]
    fn send_reader_remove(&self) {
        match self.write_control_message(VSC_MSG_READER_REMOVE) {
            Ok(()) => {
                self.inner.lock().expect("bridge mutex poisoned").reader_added = false;
            },
            Err(e) => {
                warn!(reader_id = self.reader_id, error = %e, "reader-remove notification failed");
            },
        }
    }

    fn write_control_message(&self, msg_type: u32) -> Result<(), SmartcardError> {
        let header = VscHeader::new(msg_type, self.reader_id, 0);
        let mut wb = self.device.alloc_write_buffer(HEADER_LEN)?;
        wb.fill(&header.to_wire(), &[]);
        self.device.enqueue_write(wb).map_err(SmartcardError::Io)
    }

    /// The client-to-device write path: builds a host-order header
    /// for `payload`, converts it to wire order, and enqueues it to the
    /// device's write queue.
    pub fn write_to_reader(&self, msg_type: u32, payload: &[u8]) -> Result<(), SmartcardError> {
        let header = VscHeader::new(msg_type, self.reader_id, payload.len() as u32);
        let mut wb = self.device.alloc_write_buffer(HEADER_LEN + payload.len())?;
        wb.fill(&header.to_wire(), payload);
        self.device.enqueue_write(wb).map_err(SmartcardError::Io)
    }

    /// Drains exactly one non-blocking read cycle from the device,
    /// returning the next completed message if the cycle produced one.
    /// The caller re-enters to drain the rest: a single call may leave
    /// further complete messages buffered if the device handed over more
    /// bytes than one message's worth.
    pub fn read_one_msg_from_device(&self) -> Result<Option<SmartcardMsgItem>, SmartcardError> {
        loop {
            let mut inner = self.inner.lock().expect("bridge mutex poisoned");

            if inner.buf_used >= HEADER_LEN {
                let mut header_bytes = [0u8; HEADER_LEN];
                header_bytes.copy_from_slice(&inner.buf[..HEADER_LEN]);
                let header = VscHeader::from_wire(&header_bytes);

                if header.length > MAX_SANE_LENGTH {
                    return Err(SmartcardError::MalformedHeader(header.length));
                }

                let transition = inner.read_state.apply(BridgeReadEvent::HeaderComplete {
                    length: header.length,
                });
                if let crate::state_machine::common::Transition::Next(next, ()) = transition {
                    inner.read_state = next;
                }

                Self::buf_prepare(&mut inner.buf, header.length as usize);

                if inner.buf_used >= HEADER_LEN + header.length as usize {
                    let item = Self::consume_message(&mut inner, header, self.reader_id);
                    inner.read_state = BridgeReadState::Idle;
                    match item {
                        Some(item) => return Ok(Some(item)),
                        None => continue,
                    }
                }
            } else {
                inner.read_state = inner.read_state.begin_header();
            }

            let used = inner.buf_used;
            let cap = inner.buf.len();
            if used >= cap {
                let new_len = cap.saturating_mul(2).max(used + HEADER_LEN);
                inner.buf.resize(new_len, 0);
            }
            let cap = inner.buf.len();

            let read_result = self.device.try_read(&mut inner.buf[used..cap]);
            match read_result {
                Ok(0) => {
                    let _ = inner.read_state.apply(BridgeReadEvent::WouldBlockOrEof);
                    return Ok(None);
                },
                Ok(n) => {
                    inner.buf_used += n;
                    // loop again: re-check whether a full message is now buffered
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    let _ = inner.read_state.apply(BridgeReadEvent::WouldBlockOrEof);
                    return Ok(None);
                },
                Err(e) => return Err(SmartcardError::Io(e)),
            }
        }
    }

    /// Grows `buf` to `max(2*len, length + HEADER_LEN)` if it can't yet
    /// hold a full message of the declared `length`.
    fn buf_prepare(buf: &mut Vec<u8>, length: usize) {
        let needed = HEADER_LEN + length;
        if buf.len() < needed {
            let new_size = buf.len().saturating_mul(2).max(needed);
            buf.resize(new_size, 0);
        }
    }

    /// Converts the header to host order (already done by the caller via
    /// `from_wire`), patches `reader_id` to the bridge's assigned id,
    /// shifts trailing bytes to the front, and produces the item unless
    /// the message is `Init`.
    fn consume_message(
        inner: &mut BridgeInner,
        mut header: VscHeader,
        reader_id: u32,
    ) -> Option<SmartcardMsgItem> {
        let length = header.length as usize;
        header.reader_id = reader_id;

        let payload = inner.buf[HEADER_LEN..HEADER_LEN + length].to_vec();
        let consumed = HEADER_LEN + length;
        let remaining = inner.buf_used - consumed;
        inner.buf.copy_within(consumed..consumed + remaining, 0);
        inner.buf_used = remaining;

        if header.is_init() {
            None
        } else {
            Some(SmartcardMsgItem { header, payload })
        }
    }

    /// Restores a migrated bridge's partial-read state.
    pub fn handle_migrate_data(&self, reader_added: bool, data: &[u8]) {
        let mut inner = self.inner.lock().expect("bridge mutex poisoned");
        if inner.buf.len() < data.len() {
            let new_size = inner.buf.len().saturating_mul(2).max(data.len());
            inner.buf.resize(new_size, 0);
        }
        inner.buf[..data.len()].copy_from_slice(data);
        inner.buf_used = data.len();
        inner.reader_added = reader_added;
        inner.read_state = if data.len() >= HEADER_LEN {
            BridgeReadState::AwaitingBody { length: 0 }
        } else if data.is_empty() {
            BridgeReadState::Idle
        } else {
            BridgeReadState::AwaitingHeader
        };
    }

    /// Serializes this bridge's partial-read state for migration: the
    /// counterpart to `handle_migrate_data`.
    pub fn migrate_snapshot(&self) -> crate::channel::pipe_item::SmartcardMigrateItem {
        let inner = self.inner.lock().expect("bridge mutex poisoned");
        crate::channel::pipe_item::SmartcardMigrateItem {
            reader_added: inner.reader_added,
            buf: inner.buf[..inner.buf_used].to_vec(),
        }
    }

    pub fn reader_added(&self) -> bool {
        self.inner.lock().expect("bridge mutex poisoned").reader_added
    }

    pub fn buf_size(&self) -> usize {
        self.inner.lock().expect("bridge mutex poisoned").buf.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    use super::*;
    use crate::{
        channel::stream::{BoxFuture, ClientStream},
        cfg::enums::ChannelKind,
        smartcard::header::VSC_MSG_APDU,
    };

    #[derive(Default)]
    struct ChunkedDevice {
        chunks: StdMutex<VecDeque<Vec<u8>>>,
        writes: StdMutex<Vec<Vec<u8>>>,
        active: AtomicBool,
        fail_alloc: AtomicBool,
    }

    impl ChunkedDevice {
        fn with_chunks(chunks: Vec<Vec<u8>>) -> Arc<Self> {
            Arc::new(Self {
                chunks: StdMutex::new(chunks.into()),
                ..Default::default()
            })
        }
    }

    impl CharDevice for ChunkedDevice {
        fn try_read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut chunks = self.chunks.lock().expect("poisoned");
            match chunks.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        chunks.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                },
                None => Err(std::io::Error::from(std::io::ErrorKind::WouldBlock)),
            }
        }

        fn alloc_write_buffer(&self, capacity: usize) -> Result<WriteBuffer, SmartcardError> {
            if self.fail_alloc.load(Ordering::SeqCst) {
                return Err(SmartcardError::AllocationFailed("injected failure".into()));
            }
            Ok(WriteBuffer::with_capacity(capacity))
        }

        fn enqueue_write(&self, buf: WriteBuffer) -> std::io::Result<()> {
            self.writes.lock().expect("poisoned").push(buf.into_vec());
            Ok(())
        }

        fn set_active(&self, active: bool) {
            self.active.store(active, Ordering::SeqCst);
        }
    }

    struct NullStream;

    impl ClientStream for NullStream {
        fn write_all<'a>(&'a mut self, _buf: &'a [u8]) -> BoxFuture<'a, std::io::Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn shutdown(&mut self) -> BoxFuture<'_, std::io::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn msg(msg_type: u32, reader_id: u32, payload: &[u8]) -> Vec<u8> {
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
        assert_eq!(pos, bytes.len(), "chunk sizes must cover every byte");
        out
    }

    /// Two messages delivered across odd chunk boundaries must come out
    /// exactly `M1, M2` in order with `reader_id` patched to the bridge's
    /// assigned id.
    #[test]
    fn chunked_read_reassembles_messages_in_order() {
        let m1 = msg(VSC_MSG_APDU, 0, b"abcd");
        let m2 = msg(VSC_MSG_APDU, 0, b"xy");
        let mut wire = m1.clone();
        wire.extend_from_slice(&m2);

        let chunks = chunk(&wire, &[3, 5, 8, 14]);
        let device = ChunkedDevice::with_chunks(chunks);
        let bridge = CharDeviceBridge::new(7, device, 282);

        let mut received = Vec::new();
        loop {
            match bridge.read_one_msg_from_device().expect("read failed") {
                Some(item) => received.push(item),
                None if received.len() < 2 => continue,
                None => break,
            }
        }

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].header.reader_id, 7);
        assert_eq!(received[0].payload, b"abcd");
        assert_eq!(received[1].header.reader_id, 7);
        assert_eq!(received[1].payload, b"xy");
    }

    /// A 1024-byte message forces the buffer to grow past its initial
    /// 270+12 allocation.
    #[test]
    fn buffer_growth_past_initial_allocation() {
        let payload = vec![0xAB; 1024];
        let wire = msg(VSC_MSG_APDU, 0, &payload);
        let device = ChunkedDevice::with_chunks(vec![wire]);
        let bridge = CharDeviceBridge::new(1, device, 282);

        assert_eq!(bridge.buf_size(), 282);
        let item = bridge
            .read_one_msg_from_device()
            .expect("read failed")
            .expect("expected a message");
        assert_eq!(item.payload.len(), 1024);
        assert!(bridge.buf_size() >= 1024 + HEADER_LEN);
    }

    /// Attach observes `ReaderAdd`, detach observes `ReaderRemove`, and a
    /// second detach sends nothing further.
    #[test]
    fn attach_detach_sends_reader_add_remove_once() {
        let device = ChunkedDevice::with_chunks(vec![]);
        let bridge = CharDeviceBridge::new(4, device.clone(), 282);

        let client = crate::channel::client::ChannelClient::new(
            1,
            ChannelKind::Smartcard,
            0,
            false,
            Box::new(NullStream),
        );

        bridge.attach_client(client.clone()).expect("attach failed");
        assert!(bridge.reader_added());
        {
            let writes = device.writes.lock().expect("poisoned");
            assert_eq!(writes.len(), 1);
            assert_eq!(&writes[0][0..4], &VSC_MSG_READER_ADD.to_be_bytes());
        }

        let detached = bridge.detach_client();
        assert!(detached.is_some());
        assert!(!bridge.reader_added());
        {
            let writes = device.writes.lock().expect("poisoned");
            assert_eq!(writes.len(), 2);
            assert_eq!(&writes[1][0..4], &VSC_MSG_READER_REMOVE.to_be_bytes());
        }

        assert!(bridge.detach_client().is_none());
        assert_eq!(device.writes.lock().expect("poisoned").len(), 2);
    }

    #[test]
    fn double_attach_is_rejected() {
        let device = ChunkedDevice::with_chunks(vec![]);
        let bridge = CharDeviceBridge::new(2, device, 282);
        let client_a = crate::channel::client::ChannelClient::new(
            1,
            ChannelKind::Smartcard,
            0,
            false,
            Box::new(NullStream),
        );
        let client_b = crate::channel::client::ChannelClient::new(
            2,
            ChannelKind::Smartcard,
            0,
            false,
            Box::new(NullStream),
        );
        bridge.attach_client(client_a).expect("first attach");
        assert!(matches!(
            bridge.attach_client(client_b),
            Err(SmartcardError::DoubleAttach)
        ));
    }

    #[test]
    fn reader_add_allocation_failure_leaves_reader_added_false() {
        let device = ChunkedDevice::with_chunks(vec![]);
        device.fail_alloc.store(true, Ordering::SeqCst);
        let bridge = CharDeviceBridge::new(5, device.clone(), 282);
        let client = crate::channel::client::ChannelClient::new(
            1,
            ChannelKind::Smartcard,
            0,
            false,
            Box::new(NullStream),
        );

        bridge.attach_client(client).expect("attach itself succeeds");
        assert!(!bridge.reader_added());

        // Idempotent: detach doesn't try to send a ReaderRemove for a
        // ReaderAdd that never went out.
        bridge.detach_client();
        assert!(device.writes.lock().expect("poisoned").is_empty());
    }

    /// A migration round trip preserves `reader_added`, `buf_used`, and
    /// buffer contents.
    #[test]
    fn migration_round_trip() {
        let device = ChunkedDevice::with_chunks(vec![]);
        let bridge = CharDeviceBridge::new(9, device, 282);
        bridge.handle_migrate_data(true, &[1, 2, 3, 4, 5]);

        let snapshot = bridge.migrate_snapshot();
        assert!(snapshot.reader_added);
        assert_eq!(snapshot.buf, vec![1, 2, 3, 4, 5]);

        let fresh_device = ChunkedDevice::with_chunks(vec![]);
        let fresh = CharDeviceBridge::new(9, fresh_device, 282);
        fresh.handle_migrate_data(snapshot.reader_added, &snapshot.buf);
        let restored = fresh.migrate_snapshot();
        assert_eq!(restored, snapshot);
    }
}
