// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The dispatcher queue (D): a typed MPSC channel between a submitter call
//! site and a worker task, carrying fixed-shape payloads keyed by a message
//! tag. Sync tags block the submitter until the worker has processed the
//! message; async tags return as soon as the message is enqueued and later
//! resolve through [`crate::dispatch::async_command`].

use tokio::sync::{mpsc, oneshot};

use crate::error::DispatchError;

/// Requested primary-surface resolution and cursor mode.
///
/// Owned by [`crate::device::dispatcher::DeviceDispatcher`] both as the live
/// committed state and as the two-phase-commit staging area
/// (`in_flight_primary_create`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSpec {
    pub x_res: u32,
    pub y_res: u32,
    pub use_hw_cursor: bool,
}

/// A rectangular screen region, as used by `update_area`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// A single guest-memory slot registration (`add_memslot` / `del_memslot`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemslotSpec {
    pub slot_id: u32,
    pub guest_start: u64,
    pub guest_end: u64,
}

/// Every message shape the dispatcher queue carries.
///
/// A closed set (no runtime-registered shapes) because the tag already
/// determines which variant is valid; tag/payload mismatches are a
/// programmer error caught by construction, not a runtime check.
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Cookie(u64),
    Rect(Rect),
    RectAsync { rect: Rect, cookie: u64 },
    Memslot(MemslotSpec),
    MemslotAsync { memslot: MemslotSpec, cookie: u64 },
    Surface(SurfaceSpec),
    SurfaceAsync { spec: SurfaceSpec, cookie: u64 },
    MaxMonitors(u32),
    CompressionLevel(u8),
    StreamingVideo(bool),
    MouseMode(crate::cfg::enums::MouseMode),
    LoadvmCommands(Vec<u8>),
}

/// Fixed tag table, established at construction time (RFC: "the tag table
/// is fixed at construction (an enum, not a runtime-registered table)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    Wakeup,
    Oom,
    Start,
    Stop,
    UpdateArea,
    UpdateAreaAsync,
    AddMemslot,
    AddMemslotAsync,
    DelMemslot,
    ResetMemslots,
    ResetCursor,
    ResetImageCache,
    DestroySurfaces,
    DestroySurfacesAsync,
    CreatePrimarySurface,
    CreatePrimarySurfaceAsync,
    DestroyPrimarySurface,
    DestroyPrimarySurfaceAsync,
    DestroySurfaceWait,
    DestroySurfaceWaitAsync,
    LoadvmCommands,
    GlScanout,
    GlDrawAsync,
    MonitorsConfigAsync,
    FlushSurfacesAsync,
    DriverUnload,
    SetMaxMonitors,
    SetCompression,
    SetStreamingVideo,
    SetMouseMode,
    DisplayConnect,
    CursorConnect,
    /// Terminates the worker loop. The only message that ends processing.
    StopWorker,
}

impl MessageTag {
    /// Tags in the async set: the submitter attaches a cookie and
    /// gets a later `async_complete` callback instead of an in-band reply.
    pub const fn is_async(self) -> bool {
        matches!(
            self,
            MessageTag::UpdateAreaAsync
                | MessageTag::AddMemslotAsync
                | MessageTag::DestroySurfacesAsync
                | MessageTag::DestroySurfaceWaitAsync
                | MessageTag::CreatePrimarySurfaceAsync
                | MessageTag::DestroyPrimarySurfaceAsync
                | MessageTag::FlushSurfacesAsync
                | MessageTag::MonitorsConfigAsync
                | MessageTag::GlDrawAsync
        )
    }

    /// `Wakeup`/`Oom` are rate-limited by the pending bitmask rather than by
    /// a cookie: the submitter never waits on them, so a burst of calls can
    /// be enqueued (and collapsed) before the worker has run at all.
    /// `StopWorker` is likewise fire-and-forget — the caller doesn't need to
    /// know the worker has actually exited, just that the request is queued.
    pub const fn is_fire_and_forget(self) -> bool {
        matches!(self, MessageTag::Wakeup | MessageTag::Oom | MessageTag::StopWorker)
    }

    /// Sync tags establish a happens-before: the worker's effects are
    /// visible to the submitter once `send` returns.
    pub const fn is_sync(self) -> bool {
        !self.is_async() && !self.is_fire_and_forget()
    }
}

/// One message in transit: its tag, payload, and (for sync tags) the
/// completion channel the worker acks when it has processed it.
#[derive(Debug)]
pub struct Envelope {
    pub tag: MessageTag,
    pub payload: Payload,
    pub ack: Option<oneshot::Sender<()>>,
}

/// The submitter-facing half of the dispatcher queue.
///
/// Cloning shares the same bounded channel, matching the single logical
/// queue between one submitter call site and one worker task; multiple
/// submitter callers may hold clones (e.g. guest API calls from different
/// tasks), serialized by the channel itself.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Envelope>,
}

impl DispatchQueue {
    /// Creates a bounded queue of the given capacity, returning the
    /// submitter-facing handle and the worker-facing receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues `payload` under `tag`. Async tags return once the message
    /// is queued; sync tags await the worker's completion ack, establishing
    /// a happens-before with the worker's effects.
    ///
    /// A full queue back-pressures by awaiting capacity rather than
    /// failing; enqueue only fails if the worker has stopped.
    pub async fn send(&self, tag: MessageTag, payload: Payload) -> Result<(), DispatchError> {
        if tag.is_sync() {
            let (ack_tx, ack_rx) = oneshot::channel();
            self.tx
                .send(Envelope {
                    tag,
                    payload,
                    ack: Some(ack_tx),
                })
                .await
                .map_err(|_| DispatchError::QueueClosed)?;
            ack_rx.await.map_err(|_| DispatchError::AckLost)?;
        } else {
            self.tx
                .send(Envelope {
                    tag,
                    payload,
                    ack: None,
                })
                .await
                .map_err(|_| DispatchError::QueueClosed)?;
        }
        Ok(())
    }

    /// Terminates the worker loop. Fire-and-forget: returns once the stop
    /// request is enqueued, not once the worker has actually exited.
    pub async fn stop_worker(&self) -> Result<(), DispatchError> {
        self.tx
            .send(Envelope {
                tag: MessageTag::StopWorker,
                payload: Payload::Empty,
                ack: None,
            })
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn sync_send_awaits_worker_ack() {
        let (q, mut rx) = DispatchQueue::new(4);
        let worker = tokio::spawn(async move {
            let env = rx.recv().await.expect("message");
            assert_eq!(env.tag, MessageTag::Wakeup);
            env.ack.expect("sync ack").send(()).expect("ack send");
        });

        timeout(
            Duration::from_secs(1),
            q.send(MessageTag::Wakeup, Payload::Empty),
        )
        .await
        .expect("timed out")
        .expect("send failed");

        worker.await.expect("worker panicked");
    }

    #[tokio::test]
    async fn async_send_returns_before_worker_acts() {
        let (q, mut rx) = DispatchQueue::new(4);
        q.send(
            MessageTag::UpdateAreaAsync,
            Payload::RectAsync {
                rect: Rect::default(),
                cookie: 7,
            },
        )
        .await
        .expect("send failed");

        let env = rx.recv().await.expect("message");
        assert!(env.ack.is_none());
    }

    #[tokio::test]
    async fn fifo_order_between_submitter_and_worker() {
        let (q, mut rx) = DispatchQueue::new(8);
        // Both async tags: neither blocks the submitter, so enqueue order
        // is the only thing under test.
        q.send(MessageTag::UpdateAreaAsync, Payload::Cookie(1))
            .await
            .expect("m1");
        q.send(MessageTag::GlDrawAsync, Payload::Cookie(2))
            .await
            .expect("m2");

        let first = rx.recv().await.expect("first");
        assert_eq!(first.tag, MessageTag::UpdateAreaAsync);
        let second = rx.recv().await.expect("second");
        assert_eq!(second.tag, MessageTag::GlDrawAsync);
    }
}
