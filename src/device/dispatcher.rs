// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The device dispatcher (DD): per graphics-instance wrapper around the
//! dispatcher queue that owns the worker task, tracks primary-surface
//! state, and exposes the outward API the guest device driver calls.

use std::{
    os::fd::OwnedFd,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering},
    },
};

use bitflags::bitflags;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, instrument, warn};

use crate::{
    dispatch::{
        async_command::{AsyncCommand, AsyncCommandRegistry},
        queue::{DispatchQueue, Envelope, MemslotSpec, MessageTag, Payload, Rect, SurfaceSpec},
    },
    device::guest::{GuestDevice, WorkerCallbacks},
    error::DispatchError,
    utils::next_id,
};

bitflags! {
    /// Rate-limited message categories. A second call while the bit is set
    /// is dropped silently; the worker clears the bit once it dequeues the
    /// message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PendingBitmask: u8 {
        const WAKEUP = 0b0000_0001;
        const OOM    = 0b0000_0010;
    }
}

/// Process-wide unique dispatcher identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatcherId(pub u32);

/// Live primary-surface state plus the in-flight staging area for the
/// two-phase create/destroy commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryState {
    pub active: bool,
    pub x_res: u32,
    pub y_res: u32,
    pub use_hw_cursor: bool,
    pub in_flight: SurfaceSpec,
}

/// Per graphics-instance dispatcher: owns the worker task and the queue to
/// it, and is the outward API surface a guest device driver calls.
#[derive(Debug)]
pub struct DeviceDispatcher {
    pub id: DispatcherId,
    queue: DispatchQueue,
    guest: Arc<dyn GuestDevice>,
    pending: AtomicU8,
    primary: Mutex<PrimaryState>,
    async_commands: AsyncCommandRegistry,
    max_monitors: AtomicU32,
    scanout: Mutex<Option<OwnedFd>>,
    gl_draw_in_flight: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceDispatcher {
    /// Builds a new dispatcher, spawns its worker task, and returns the
    /// shared handle. The caller is responsible for registering it with a
    /// [`crate::device::registry::DispatcherRegistry`] for fan-out.
    pub fn new(
        guest: Arc<dyn GuestDevice>,
        handler: Arc<dyn WorkerCallbacks>,
        queue_capacity: usize,
        max_monitors_default: u32,
    ) -> Arc<Self> {
        let (queue, rx) = DispatchQueue::new(queue_capacity);
        let dispatcher = Arc::new(Self {
            id: DispatcherId(next_id()),
            queue,
            guest,
            pending: AtomicU8::new(0),
            primary: Mutex::new(PrimaryState::default()),
            async_commands: AsyncCommandRegistry::new(),
            max_monitors: AtomicU32::new(max_monitors_default.max(1)),
            scanout: Mutex::new(None),
            gl_draw_in_flight: AtomicBool::new(false),
            worker: Mutex::new(None),
        });

        let weak = Arc::downgrade(&dispatcher);
        let join = tokio::spawn(worker_loop(rx, handler, weak));
        *dispatcher.worker.lock().expect("worker mutex poisoned") = Some(join);
        dispatcher
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// The guest callback surface, used by the fan-out controller to push
    /// compression-level and mouse-allowed notifications.
    pub fn guest(&self) -> &Arc<dyn GuestDevice> {
        &self.guest
    }

    pub fn is_primary_active(&self) -> bool {
        self.primary.lock().expect("primary mutex poisoned").active
    }

    pub fn use_hw_cursor(&self) -> bool {
        self.primary.lock().expect("primary mutex poisoned").use_hw_cursor
    }

    pub fn resolution(&self) -> (u32, u32) {
        let p = self.primary.lock().expect("primary mutex poisoned");
        (p.x_res, p.y_res)
    }

    /// Rate-limited: a call while `WAKEUP` is already pending is dropped.
    pub async fn wakeup(&self) -> Result<(), DispatchError> {
        if self.try_set_pending(PendingBitmask::WAKEUP) {
            self.queue.send(MessageTag::Wakeup, Payload::Empty).await?;
        }
        Ok(())
    }

    /// Rate-limited: a call while `OOM` is already pending is dropped.
    pub async fn oom(&self) -> Result<(), DispatchError> {
        if self.try_set_pending(PendingBitmask::OOM) {
            self.queue.send(MessageTag::Oom, Payload::Empty).await?;
        }
        Ok(())
    }

    /// Non-atomic load/compare/store on purpose: the only effect of a
    /// race is a redundant send, which is harmless.
    fn try_set_pending(&self, bit: PendingBitmask) -> bool {
        let bits = self.pending.load(Ordering::Relaxed);
        if bits & bit.bits() != 0 {
            return false;
        }
        self.pending.store(bits | bit.bits(), Ordering::Relaxed);
        true
    }

    pub(crate) fn clear_pending(&self, bit: PendingBitmask) {
        let bits = self.pending.load(Ordering::Relaxed);
        self.pending.store(bits & !bit.bits(), Ordering::Relaxed);
    }

    pub fn pending(&self) -> PendingBitmask {
        PendingBitmask::from_bits_truncate(self.pending.load(Ordering::Relaxed))
    }

    pub async fn start(&self) -> Result<(), DispatchError> {
        self.queue.send(MessageTag::Start, Payload::Empty).await
    }

    pub async fn stop(&self) -> Result<(), DispatchError> {
        self.queue.send(MessageTag::Stop, Payload::Empty).await
    }

    pub async fn update_area(&self, rect: Rect) -> Result<(), DispatchError> {
        self.queue.send(MessageTag::UpdateArea, Payload::Rect(rect)).await
    }

    pub async fn update_area_async(
        &self,
        rect: Rect,
        cookie: u64,
    ) -> Result<(), DispatchError> {
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::UpdateAreaAsync,
            cookie,
        });
        self.queue
            .send(MessageTag::UpdateAreaAsync, Payload::RectAsync { rect, cookie })
            .await
    }

    pub async fn add_memslot(&self, memslot: MemslotSpec) -> Result<(), DispatchError> {
        self.queue
            .send(MessageTag::AddMemslot, Payload::Memslot(memslot))
            .await
    }

    pub async fn add_memslot_async(
        &self,
        memslot: MemslotSpec,
        cookie: u64,
    ) -> Result<(), DispatchError> {
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::AddMemslotAsync,
            cookie,
        });
        self.queue
            .send(
                MessageTag::AddMemslotAsync,
                Payload::MemslotAsync { memslot, cookie },
            )
            .await
    }

    pub async fn del_memslot(&self, slot_id: u32) -> Result<(), DispatchError> {
        self.queue
            .send(
                MessageTag::DelMemslot,
                Payload::Memslot(MemslotSpec {
                    slot_id,
                    guest_start: 0,
                    guest_end: 0,
                }),
            )
            .await
    }

    pub async fn reset_memslots(&self) -> Result<(), DispatchError> {
        self.queue.send(MessageTag::ResetMemslots, Payload::Empty).await
    }

    pub async fn reset_cursor(&self) -> Result<(), DispatchError> {
        self.queue.send(MessageTag::ResetCursor, Payload::Empty).await
    }

    pub async fn reset_image_cache(&self) -> Result<(), DispatchError> {
        self.queue
            .send(MessageTag::ResetImageCache, Payload::Empty)
            .await
    }

    pub async fn destroy_surfaces(&self) -> Result<(), DispatchError> {
        self.queue
            .send(MessageTag::DestroySurfaces, Payload::Empty)
            .await
    }

    pub async fn destroy_surfaces_async(&self, cookie: u64) -> Result<(), DispatchError> {
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::DestroySurfacesAsync,
            cookie,
        });
        self.queue
            .send(MessageTag::DestroySurfacesAsync, Payload::Cookie(cookie))
            .await
    }

    pub async fn destroy_surface_wait(&self) -> Result<(), DispatchError> {
        self.queue
            .send(MessageTag::DestroySurfaceWait, Payload::Empty)
            .await
    }

    pub async fn destroy_surface_wait_async(&self, cookie: u64) -> Result<(), DispatchError> {
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::DestroySurfaceWaitAsync,
            cookie,
        });
        self.queue
            .send(MessageTag::DestroySurfaceWaitAsync, Payload::Cookie(cookie))
            .await
    }

    pub async fn loadvm_commands(&self, commands: Vec<u8>) -> Result<(), DispatchError> {
        self.queue
            .send(MessageTag::LoadvmCommands, Payload::LoadvmCommands(commands))
            .await
    }

    /// Two-phase commit collapsed to one call: stages `spec`, sends, and
    /// commits around the blocking send.
    #[instrument(skip(self))]
    pub async fn create_primary_surface(&self, spec: SurfaceSpec) -> Result<(), DispatchError> {
        {
            let mut p = self.primary.lock().expect("primary mutex poisoned");
            p.in_flight = spec;
        }
        self.queue
            .send(MessageTag::CreatePrimarySurface, Payload::Surface(spec))
            .await?;
        self.commit_primary_create();
        Ok(())
    }

    /// Stages `spec` before sending; the live fields commit only when the
    /// worker later reports completion via [`Self::complete_async`].
    pub async fn create_primary_surface_async(
        &self,
        spec: SurfaceSpec,
        cookie: u64,
    ) -> Result<(), DispatchError> {
        {
            let mut p = self.primary.lock().expect("primary mutex poisoned");
            p.in_flight = spec;
        }
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::CreatePrimarySurfaceAsync,
            cookie,
        });
        self.queue
            .send(
                MessageTag::CreatePrimarySurfaceAsync,
                Payload::SurfaceAsync { spec, cookie },
            )
            .await
    }

    pub async fn destroy_primary_surface(&self) -> Result<(), DispatchError> {
        self.queue
            .send(MessageTag::DestroyPrimarySurface, Payload::Empty)
            .await?;
        self.commit_primary_destroy();
        Ok(())
    }

    pub async fn destroy_primary_surface_async(&self, cookie: u64) -> Result<(), DispatchError> {
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::DestroyPrimarySurfaceAsync,
            cookie,
        });
        self.queue
            .send(MessageTag::DestroyPrimarySurfaceAsync, Payload::Cookie(cookie))
            .await
    }

    /// Replaces the cached DMA-buf scanout descriptor under the per-instance
    /// mutex, dropping (closing) the old one, then sends a `GlScanout`
    /// message.
    pub async fn gl_scanout(&self, fd: OwnedFd) -> Result<(), DispatchError> {
        {
            let mut slot = self.scanout.lock().expect("scanout mutex poisoned");
            *slot = Some(fd); // old fd, if any, closes here on drop
        }
        self.queue.send(MessageTag::GlScanout, Payload::Empty).await
    }

    /// Requires a prior `gl_scanout`; a second call while one draw is
    /// outstanding is an error, not a silent drop (no bitmask for this
    /// category).
    pub async fn gl_draw_async(&self, cookie: u64) -> Result<(), DispatchError> {
        if self.scanout.lock().expect("scanout mutex poisoned").is_none() {
            return Err(DispatchError::NoScanout);
        }
        if self.gl_draw_in_flight.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::GlDrawInFlight);
        }
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::GlDrawAsync,
            cookie,
        });
        self.queue
            .send(MessageTag::GlDrawAsync, Payload::Cookie(cookie))
            .await
    }

    pub async fn monitors_config_async(
        &self,
        monitor_count: u32,
        cookie: u64,
    ) -> Result<(), DispatchError> {
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::MonitorsConfigAsync,
            cookie,
        });
        let _ = monitor_count;
        self.queue
            .send(MessageTag::MonitorsConfigAsync, Payload::Cookie(cookie))
            .await
    }

    pub async fn flush_surfaces_async(&self, cookie: u64) -> Result<(), DispatchError> {
        self.async_commands.submit(AsyncCommand {
            tag: MessageTag::FlushSurfacesAsync,
            cookie,
        });
        self.queue
            .send(MessageTag::FlushSurfacesAsync, Payload::Cookie(cookie))
            .await
    }

    pub async fn driver_unload(&self) -> Result<(), DispatchError> {
        self.queue.send(MessageTag::DriverUnload, Payload::Empty).await
    }

    /// Floor of 1; values below that are rejected rather than clamped.
    pub fn set_max_monitors(&self, max_monitors: u32) -> Result<(), DispatchError> {
        if max_monitors < 1 {
            return Err(DispatchError::InvalidMaxMonitors(max_monitors));
        }
        self.max_monitors.store(max_monitors, Ordering::Relaxed);
        Ok(())
    }

    pub fn max_monitors(&self) -> u32 {
        self.max_monitors.load(Ordering::Relaxed)
    }

    /// Invoked by the worker side (or a test/demo `WorkerCallbacks`) once an
    /// async command has actually finished. Performs the tag-specific
    /// post-action, then the guest callback, exactly once.
    #[instrument(skip(self))]
    pub fn complete_async(&self, cookie: u64) {
        let tag = self.async_commands.complete(cookie);
        match tag {
            Some(MessageTag::CreatePrimarySurfaceAsync) => self.commit_primary_create(),
            Some(MessageTag::DestroyPrimarySurfaceAsync) => self.commit_primary_destroy(),
            Some(MessageTag::GlDrawAsync) => {
                self.gl_draw_in_flight.store(false, Ordering::Release);
            },
            Some(_) => {},
            None => {
                warn!(cookie, "completing unregistered async command, forwarding anyway");
            },
        }
        self.guest.async_complete(cookie);
    }

    fn commit_primary_create(&self) {
        let mut p = self.primary.lock().expect("primary mutex poisoned");
        let staged = p.in_flight;
        p.x_res = staged.x_res;
        p.y_res = staged.y_res;
        p.use_hw_cursor = staged.use_hw_cursor;
        p.active = true;
    }

    fn commit_primary_destroy(&self) {
        let mut p = self.primary.lock().expect("primary mutex poisoned");
        p.active = false;
        p.x_res = 0;
        p.y_res = 0;
        p.use_hw_cursor = false;
    }
}

/// The worker task loop: dequeues envelopes in FIFO order, runs the pluggable
/// handler, clears the pending bitmask for rate-limited tags, and acks sync
/// sends. Terminates only on `StopWorker`.
async fn worker_loop(
    mut rx: mpsc::Receiver<Envelope>,
    handler: Arc<dyn WorkerCallbacks>,
    dispatcher: Weak<DeviceDispatcher>,
) {
    while let Some(env) = rx.recv().await {
        if env.tag == MessageTag::StopWorker {
            debug!("worker loop stopping");
            break;
        }

        if matches!(env.tag, MessageTag::Wakeup | MessageTag::Oom) {
            if let Some(d) = dispatcher.upgrade() {
                let bit = if env.tag == MessageTag::Wakeup {
                    PendingBitmask::WAKEUP
                } else {
                    PendingBitmask::OOM
                };
                d.clear_pending(bit);
            }
        }

        let ack = env.ack;
        handler.on_message(dispatcher.clone(), env.tag, env.payload);
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }
}
