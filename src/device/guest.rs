// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The two trait seams the device dispatcher calls through: the guest
//! driver's callback surface (`GuestDevice`, invoked *by* the dispatcher),
//! and the worker's message-processing seam (`WorkerCallbacks`, where the
//! external render pipeline this crate does not implement would plug in).

use std::sync::Weak;

use crate::{
    device::dispatcher::DeviceDispatcher,
    dispatch::queue::{MessageTag, Payload},
};

/// Callback surface the guest device driver exposes back to the server.
///
/// `wakeup`/`oom`/`update_area`/… are *inbound* calls the driver makes on
/// [`DeviceDispatcher`]; this trait is the other direction — completions
/// and policy pushes the server delivers to the driver.
pub trait GuestDevice: Send + Sync {
    /// Exactly one call per allocated async cookie.
    fn async_complete(&self, cookie: u64);

    /// Pushed whenever the fan-out controller recomputes the compression
    /// level from the image-compression/streaming-video knobs.
    fn set_compression_level(&self, level: u8) {
        let _ = level;
    }

    /// Edge-triggered notification of the computed mouse-allowed state and
    /// its tablet extents: fires only when `allowed` actually changes, not
    /// on every call that happens to compute `true`.
    fn mouse_allowed_changed(&self, allowed: bool, x_res: u32, y_res: u32) {
        let _ = (allowed, x_res, y_res);
    }
}

/// The worker-side seam a render pipeline plugs into.
///
/// `on_message` runs on the worker task for every dequeued message,
/// including async ones; it decides *when* to report completion by calling
/// [`DeviceDispatcher::complete_async`] on the upgraded handle — immediately
/// (for cheap operations) or from a further spawned task (for anything that
/// takes real work). This crate ships only the dispatch fabric, not a
/// drawing pipeline, so the default test/demo handler completes
/// synchronously.
pub trait WorkerCallbacks: Send + Sync {
    fn on_message(
        &self,
        dispatcher: Weak<DeviceDispatcher>,
        tag: MessageTag,
        payload: Payload,
    );
}

/// A `WorkerCallbacks` that immediately completes every async command it
/// sees and otherwise does nothing. Useful for tests and as the default for
/// callers that don't need real rendering semantics.
#[derive(Debug, Default)]
pub struct ImmediateWorker;

impl WorkerCallbacks for ImmediateWorker {
    fn on_message(
        &self,
        dispatcher: Weak<DeviceDispatcher>,
        tag: MessageTag,
        payload: Payload,
    ) {
        if !tag.is_async() {
            return;
        }
        let Some(cookie) = payload_cookie(&payload) else {
            return;
        };
        if let Some(d) = dispatcher.upgrade() {
            d.complete_async(cookie);
        }
    }
}

fn payload_cookie(payload: &Payload) -> Option<u64> {
    match payload {
        Payload::Cookie(c) => Some(*c),
        Payload::RectAsync { cookie, .. }
        | Payload::MemslotAsync { cookie, .. }
        | Payload::SurfaceAsync { cookie, .. } => Some(*cookie),
        _ => None,
    }
}
