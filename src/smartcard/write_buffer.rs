// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The outbound `WriteBuffer`: a server-allocated buffer
//! sized for one header-plus-payload message, filled in host order and
//! then converted to wire order in place by the bridge before it is
//! handed to the device's write queue.

/// A single outbound message buffer, owned end to end: allocated by the
/// device seam, filled by [`crate::smartcard::bridge::CharDeviceBridge`],
/// and consumed by [`crate::smartcard::device::CharDevice::enqueue_write`].
#[derive(Debug, Clone, Default)]
pub struct WriteBuffer {
    bytes: Vec<u8>,
}

impl WriteBuffer {
    /// Allocates a buffer with at least `capacity` bytes of backing
    /// storage, before any bytes are filled in.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Fills the buffer with the wire-order header followed by `payload`,
    /// replacing any prior contents.
    pub fn fill(&mut self, header_wire: &[u8], payload: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(header_wire);
        self.bytes.extend_from_slice(payload);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}
