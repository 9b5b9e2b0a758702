// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The process-wide fan-out controller (G): the dispatcher registry plus
//! global policy broadcast (mouse mode, compression, VM start/stop, driver
//! unload) and the mouse-allowed computation.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use tracing::instrument;

use crate::{
    cfg::enums::{ImageCompression, MouseMode, StreamingVideo},
    device::dispatcher::{DeviceDispatcher, DispatcherId},
    dispatch::queue::{MessageTag, Payload},
    error::DispatchError,
};

/// Process-wide registry of every live [`DeviceDispatcher`], used for fan-out
/// broadcasts and the mouse-allowed computation.
///
/// Append-only from the registering caller; guarded with an `RwLock` rather
/// than relying on single-thread access, since multiple tasks may register
/// or unregister a dispatcher concurrently.
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: RwLock<Vec<Arc<DeviceDispatcher>>>,
    /// Edge-detection cache for `update_client_mouse_allowed`: notifies only
    /// on transitions of `allowed`, not on every call where `allow_now`
    /// happens to be true. Deliberately not `allow_now || allow_now !=
    /// allowed`, which would fire on every call once mouse input is
    /// allowed.
    mouse_allowed: AtomicBool,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dispatcher for fan-out.
    pub fn register(&self, dispatcher: Arc<DeviceDispatcher>) {
        self.dispatchers
            .write()
            .expect("dispatcher registry poisoned")
            .push(dispatcher);
    }

    /// Removes a dispatcher from the fan-out set, e.g. on device teardown.
    pub fn unregister(&self, id: DispatcherId) {
        self.dispatchers
            .write()
            .expect("dispatcher registry poisoned")
            .retain(|d| d.id != id);
    }

    pub fn len(&self) -> usize {
        self.dispatchers.read().expect("dispatcher registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<DeviceDispatcher>> {
        self.dispatchers
            .read()
            .expect("dispatcher registry poisoned")
            .clone()
    }

    /// VM start, broadcast to every worker. Each send is independently
    /// FIFO-ordered against its own instance's prior traffic; no ordering is
    /// implied across instances.
    pub async fn broadcast_start(&self) -> Result<(), DispatchError> {
        for d in self.snapshot() {
            d.start().await?;
        }
        Ok(())
    }

    pub async fn broadcast_stop(&self) -> Result<(), DispatchError> {
        for d in self.snapshot() {
            d.stop().await?;
        }
        Ok(())
    }

    pub async fn broadcast_driver_unload(&self) -> Result<(), DispatchError> {
        for d in self.snapshot() {
            d.driver_unload().await?;
        }
        Ok(())
    }

    pub async fn broadcast_mouse_mode(&self, mode: MouseMode) -> Result<(), DispatchError> {
        for d in self.snapshot() {
            d.queue()
                .send(MessageTag::SetMouseMode, Payload::MouseMode(mode))
                .await?;
        }
        Ok(())
    }

    /// Recomputes the compression level from both knobs, pushes it to every
    /// device's guest callback, then broadcasts the two worker messages
    ///.
    pub async fn set_compression_policy(
        &self,
        image_compression: ImageCompression,
        streaming_video: StreamingVideo,
    ) -> Result<(), DispatchError> {
        let level = compression_level(image_compression, streaming_video);
        let dispatchers = self.snapshot();

        for d in &dispatchers {
            d.guest().set_compression_level(level);
        }
        for d in &dispatchers {
            d.queue()
                .send(MessageTag::SetCompression, Payload::CompressionLevel(level))
                .await?;
            d.queue()
                .send(
                    MessageTag::SetStreamingVideo,
                    Payload::StreamingVideo(streaming_video.as_bool()),
                )
                .await?;
        }
        Ok(())
    }

    /// Mouse input is allowed iff at least one active primary surface
    /// exists and every active primary surface advertises a hardware
    /// cursor. When exactly one active primary dispatcher allows mouse, its
    /// resolution is reported as the tablet extents; otherwise `(0, 0)`.
    /// Notifies every registered device's guest callback, but only on an
    /// edge transition of the computed `allowed` value.
    #[instrument(skip(self))]
    pub fn update_client_mouse_allowed(&self) {
        let dispatchers = self.snapshot();
        let active: Vec<&Arc<DeviceDispatcher>> = dispatchers
            .iter()
            .filter(|d| d.is_primary_active())
            .collect();

        let allow_now = !active.is_empty() && active.iter().all(|d| d.use_hw_cursor());
        let (x_res, y_res) = if allow_now && active.len() == 1 {
            active[0].resolution()
        } else {
            (0, 0)
        };

        let previous = self.mouse_allowed.swap(allow_now, Ordering::AcqRel);
        if previous == allow_now {
            return;
        }

        for d in &dispatchers {
            d.guest().mouse_allowed_changed(allow_now, x_res, y_res);
        }
    }

    pub fn mouse_allowed(&self) -> bool {
        self.mouse_allowed.load(Ordering::Acquire)
    }
}

/// Maps the two independent compression knobs onto a single wire-level
/// compression-quality scalar (0 = no compression, 9 = maximum). Streaming
/// video forces the lowest-latency level regardless of the still-image
/// compression mode, since motion content is about to be handled by the
/// (out-of-scope) video-streaming codec path rather than the still-image
/// compressor; otherwise the still-image mode's own level applies.
pub fn compression_level(image: ImageCompression, streaming: StreamingVideo) -> u8 {
    if streaming.as_bool() {
        return 1;
    }
    match image {
        ImageCompression::Off => 0,
        ImageCompression::Lz4 => 2,
        ImageCompression::Quic | ImageCompression::AutoLz | ImageCompression::Lz => 5,
        ImageCompression::AutoGlz | ImageCompression::Glz => 8,
    }
}
