// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use vchannel_dispatch::{
    channel::stream::{BoxFuture, ClientStream},
    error::SmartcardError,
    smartcard::{device::CharDevice, write_buffer::WriteBuffer},
};

/// A host char device backed by a queue of pre-chunked reads, matching how
/// a real non-blocking device hands over whatever bytes happened to arrive
/// in one poll cycle.
#[derive(Default)]
pub struct FakeCharDevice {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    pub writes: Mutex<Vec<Vec<u8>>>,
}

impl FakeCharDevice {
    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            chunks: Mutex::new(chunks.into()),
            writes: Mutex::new(Vec::new()),
        })
    }
}

impl CharDevice for FakeCharDevice {
    fn try_read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut chunks = self.chunks.lock().expect("poisoned");
        match chunks.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            },
            None => Err(std::io::Error::from(std::io::ErrorKind::WouldBlock)),
        }
    }

    fn alloc_write_buffer(&self, capacity: usize) -> Result<WriteBuffer, SmartcardError> {
        Ok(WriteBuffer::with_capacity(capacity))
    }

    fn enqueue_write(&self, buf: WriteBuffer) -> std::io::Result<()> {
        self.writes.lock().expect("poisoned").push(buf.into_vec());
        Ok(())
    }

    fn set_active(&self, _active: bool) {}
}

/// A client transport that records every byte written to it, in order.
#[derive(Default)]
pub struct RecordingStream {
    pub written: Arc<Mutex<Vec<u8>>>,
}

impl RecordingStream {
    pub fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                written: written.clone(),
            },
            written,
        )
    }
}

impl ClientStream for RecordingStream {
    fn write_all<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, std::io::Result<()>> {
        self.written.lock().expect("poisoned").extend_from_slice(buf);
        Box::pin(async { Ok(()) })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
