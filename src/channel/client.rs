// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The channel client: one side of a connected client on a channel. Owns
//! an outbound pipe with flow control and the per-channel send-item
//! dispatch on item tags.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use tracing::{instrument, warn};

use crate::{
    cfg::enums::ChannelKind,
    channel::{
        pipe_item::PipeItem,
        stream::ClientStream,
    },
    error::ChannelError,
    smartcard::{
        header::HEADER_LEN,
        migrate::{SMARTCARD_MIGRATE_MAGIC, SMARTCARD_MIGRATE_VERSION},
    },
};

/// Whether the client's send loop is free to dequeue the next pipe item or
/// backed up behind a prior short write. Modeled explicitly rather than
/// inferred from the stream, matching the data model's `send_state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Blocked,
}

/// Per-(channel, client) instance.
pub struct ChannelClient {
    pub id: u32,
    pub kind: ChannelKind,
    pub channel_id: u32,
    migratable: bool,
    stream: Mutex<Box<dyn ClientStream>>,
    pipe: Mutex<VecDeque<PipeItem>>,
    send_state: Mutex<SendState>,
    waiting_for_migrate_data: AtomicBool,
    /// Zero-message initial ACK window requested at connect time for the
    /// smartcard channel: the number of items the client may still
    /// receive before the next explicit ACK is required. `u32::MAX` means
    /// "unbounded" (the graphics channels' default).
    ack_window: AtomicU32,
}

pub type ChannelClientHandle = Arc<ChannelClient>;

impl ChannelClient {
    pub fn new(
        id: u32,
        kind: ChannelKind,
        channel_id: u32,
        migratable: bool,
        stream: Box<dyn ClientStream>,
    ) -> ChannelClientHandle {
        Arc::new(Self {
            id,
            kind,
            channel_id,
            migratable,
            stream: Mutex::new(stream),
            pipe: Mutex::new(VecDeque::new()),
            send_state: Mutex::new(SendState::Idle),
            waiting_for_migrate_data: AtomicBool::new(false),
            ack_window: AtomicU32::new(u32::MAX),
        })
    }

    /// References (moves ownership of) `item` into the outbound pipe.
    pub fn pipe_add_push(&self, item: PipeItem) {
        self.pipe.lock().expect("pipe mutex poisoned").push_back(item);
    }

    pub fn pipe_len(&self) -> usize {
        self.pipe.lock().expect("pipe mutex poisoned").len()
    }

    /// Requests an initial ACK window of `count` messages. The smartcard
    /// channel requests a zero-message window at connect time, meaning the
    /// client must ACK before the first real message is sent.
    pub fn request_ack_window(&self, count: u32) {
        self.ack_window.store(count, Ordering::Relaxed);
    }

    pub fn ack_window(&self) -> u32 {
        self.ack_window.load(Ordering::Relaxed)
    }

    pub fn set_waiting_for_migrate_data(&self, waiting: bool) {
        self.waiting_for_migrate_data.store(waiting, Ordering::Relaxed);
    }

    pub fn is_waiting_for_migrate_data(&self) -> bool {
        self.waiting_for_migrate_data.load(Ordering::Relaxed)
    }

    /// Drains the pipe in order, marshalling each item per its tag.
    /// Disconnect-on-fatal-error semantics (unrecognized tag, not-migratable
    /// channel) are the caller's responsibility: this only reports the
    /// error, it never panics the process.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<(), ChannelError> {
        loop {
            let item = { self.pipe.lock().expect("pipe mutex poisoned").pop_front() };
            let Some(item) = item else { break };
            self.send_item(item).await?;
        }
        Ok(())
    }

    /// Marshals and writes one item: dispatches on `{Error, Data,
    /// MigrateData}`; this crate's closed `PipeItem` enum makes every tag
    /// recognized, so the "unrecognized tag" fatal path documented in
    /// `ChannelError::UnrecognizedPipeItem` is reserved for a future channel
    /// kind's own item shapes rather than reachable here.
    pub async fn send_item(&self, item: PipeItem) -> Result<(), ChannelError> {
        match item {
            PipeItem::Error(e) => self.write_bytes(e.message.as_bytes()).await,
            PipeItem::SmartcardData(d) => {
                let header = d.header.to_wire();
                let mut bytes = Vec::with_capacity(HEADER_LEN + d.payload.len());
                bytes.extend_from_slice(&header);
                bytes.extend_from_slice(&d.payload);
                self.write_bytes(&bytes).await
            },
            PipeItem::SmartcardMigrateData(m) => {
                if !self.migratable {
                    return Err(ChannelError::NotMigratable);
                }
                self.write_bytes(&marshal_migrate_data(&m)).await
            },
        }
    }

    async fn write_bytes(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        {
            *self.send_state.lock().expect("send_state mutex poisoned") = SendState::Blocked;
        }
        let mut stream = self.stream.lock().expect("stream mutex poisoned");
        let result = stream.write_all(bytes).await;
        drop(stream);
        *self.send_state.lock().expect("send_state mutex poisoned") = SendState::Idle;
        result.map_err(ChannelError::Io)
    }

    /// Disconnect cancels only not-yet-sent pipe items: they are
    /// dropped, never sent.
    pub fn disconnect(&self) {
        let dropped = self.pipe.lock().expect("pipe mutex poisoned").len();
        if dropped > 0 {
            warn!(dropped, client = self.id, "discarding unsent pipe items on disconnect");
        }
        self.pipe.lock().expect("pipe mutex poisoned").clear();
    }
}

/// `{magic: u32, version: u32}` followed by either an empty marker (no
/// bridge attached) or `{reader_added: u8, buf_used: u32, buf[buf_used]}`
///.
fn marshal_migrate_data(item: &crate::channel::pipe_item::SmartcardMigrateItem) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + 1 + 4 + item.buf.len());
    bytes.extend_from_slice(&SMARTCARD_MIGRATE_MAGIC.to_be_bytes());
    bytes.extend_from_slice(&SMARTCARD_MIGRATE_VERSION.to_be_bytes());
    bytes.push(u8::from(item.reader_added));
    bytes.extend_from_slice(&(item.buf.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&item.buf);
    bytes
}
