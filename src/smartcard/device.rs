// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The host character-device seam: OS char-device I/O is an
//! external collaborator this crate does not implement, so
//! [`CharDeviceBridge`](crate::smartcard::bridge::CharDeviceBridge) talks
//! to it only through this trait.

use crate::{error::SmartcardError, smartcard::write_buffer::WriteBuffer};

/// Non-blocking read/write/state seam for the host's smartcard reader
/// character device.
///
/// Mirrors [`crate::channel::stream::ClientStream`] on the wire side: the
/// bridge owns the framing and buffering logic, this trait owns only the
/// raw bytes-in/bytes-out/active-flag primitives a real char device (or a
/// test double) provides.
pub trait CharDevice: Send + Sync {
    /// Non-blocking read into `buf`. `Ok(0)` means EOF; `Err` with
    /// [`std::io::ErrorKind::WouldBlock`] means "no data right now, try
    /// again on the next readable event".
    fn try_read(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Allocates an outbound [`WriteBuffer`] of at least `capacity` bytes.
    /// May fail under memory pressure; reported as an error, not fatal.
    fn alloc_write_buffer(&self, capacity: usize) -> Result<WriteBuffer, SmartcardError>;

    /// Hands a filled buffer to the device's write queue for eventual
    /// delivery to the physical reader.
    fn enqueue_write(&self, buf: WriteBuffer) -> std::io::Result<()>;

    /// Flips the device's active/inactive indicator, driven by attach and
    /// detach.
    fn set_active(&self, active: bool);
}
