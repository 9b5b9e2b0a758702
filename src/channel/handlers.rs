// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Concrete [`ChannelConnectHandler`]s: the graphics channels
//! enqueue a connect message onto the backing [`DeviceDispatcher`]'s
//! worker; the smartcard channel hands the new client its zero-message
//! ACK window and attaches it to the first free reader.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::{
    channel::{
        channel::{ChannelCapabilities, ChannelConnectHandler},
        client::ChannelClientHandle,
    },
    device::dispatcher::DeviceDispatcher,
    dispatch::queue::{MessageTag, Payload},
    error::ChannelError,
    smartcard::reader_table::ReaderTable,
};

/// Connect handler for the `Display`/`Cursor` channel kinds: enqueues
/// `DisplayConnect`/`CursorConnect` onto the backing dispatcher's worker
///.
pub struct GraphicsConnectHandler {
    dispatcher: Arc<DeviceDispatcher>,
    tag: MessageTag,
}

impl GraphicsConnectHandler {
    pub fn new(dispatcher: Arc<DeviceDispatcher>, tag: MessageTag) -> Self {
        debug_assert!(
            matches!(tag, MessageTag::DisplayConnect | MessageTag::CursorConnect),
            "GraphicsConnectHandler is only valid for the display/cursor connect tags"
        );
        Self { dispatcher, tag }
    }
}

impl ChannelConnectHandler for GraphicsConnectHandler {
    #[instrument(skip(self, _client))]
    fn on_connect(
        &self,
        _client: ChannelClientHandle,
        _caps: ChannelCapabilities,
    ) -> Result<(), ChannelError> {
        let queue = self.dispatcher.queue().clone();
        let tag = self.tag;
        tokio::spawn(async move {
            if let Err(e) = queue.send(tag, Payload::Empty).await {
                warn!(error = %e, "connect notification failed to reach worker");
            }
        });
        Ok(())
    }

    fn on_disconnect(&self, _client: ChannelClientHandle) {}
}

/// Connect handler for the `Smartcard` channel kind: requests a
/// zero-message initial ACK window and attaches the new client to the
/// first unattached reader, if any.
pub struct SmartcardConnectHandler {
    readers: Arc<ReaderTable>,
}

impl SmartcardConnectHandler {
    pub fn new(readers: Arc<ReaderTable>) -> Self {
        Self { readers }
    }
}

impl ChannelConnectHandler for SmartcardConnectHandler {
    #[instrument(skip(self, client))]
    fn on_connect(
        &self,
        client: ChannelClientHandle,
        _caps: ChannelCapabilities,
    ) -> Result<(), ChannelError> {
        client.request_ack_window(0);

        if let Some(reader_id) = self.readers.first_unattached() {
            if let Err(e) = self.readers.attach(reader_id, client.id, client.clone()) {
                warn!(reader_id, error = %e, "failed to attach new smartcard client to reader");
            }
        }
        Ok(())
    }

    fn on_disconnect(&self, client: ChannelClientHandle) {
        if let Some(reader_id) = self.readers.reader_for_client(client.id) {
            self.readers.detach(reader_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::enums::ChannelKind,
        channel::{
            client::ChannelClient,
            stream::{BoxFuture, ClientStream},
        },
        smartcard::{device::CharDevice, write_buffer::WriteBuffer},
    };

    struct NullStream;

    impl ClientStream for NullStream {
        fn write_all<'a>(&'a mut self, _buf: &'a [u8]) -> BoxFuture<'a, std::io::Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn shutdown(&mut self) -> BoxFuture<'_, std::io::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct NullDevice;

    impl CharDevice for NullDevice {
        fn try_read(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::WouldBlock))
        }

        fn alloc_write_buffer(&self, capacity: usize) -> Result<WriteBuffer, crate::error::SmartcardError> {
            Ok(WriteBuffer::with_capacity(capacity))
        }

        fn enqueue_write(&self, _buf: WriteBuffer) -> std::io::Result<()> {
            Ok(())
        }

        fn set_active(&self, _active: bool) {}
    }

    #[test]
    fn connect_requests_zero_ack_window_and_attaches_first_reader() {
        let readers = Arc::new(ReaderTable::new(10));
        let reader = readers.add_reader(Arc::new(NullDevice), 282).expect("add failed");
        let handler = SmartcardConnectHandler::new(readers.clone());

        let client = ChannelClient::new(1, ChannelKind::Smartcard, 0, false, Box::new(NullStream));
        handler.on_connect(client.clone(), ChannelCapabilities::empty()).expect("connect failed");

        assert_eq!(client.ack_window(), 0);
        assert_eq!(readers.reader_for_client(1), Some(reader.reader_id));
    }

    #[test]
    fn disconnect_detaches_the_clients_reader() {
        let readers = Arc::new(ReaderTable::new(10));
        let reader = readers.add_reader(Arc::new(NullDevice), 282).expect("add failed");
        let handler = SmartcardConnectHandler::new(readers.clone());

        let client = ChannelClient::new(1, ChannelKind::Smartcard, 0, false, Box::new(NullStream));
        handler.on_connect(client.clone(), ChannelCapabilities::empty()).expect("connect failed");
        handler.on_disconnect(client);

        assert!(!readers.get(reader.reader_id).expect("reader gone").is_attached());
    }

    #[test]
    fn connect_with_no_free_reader_leaves_client_unattached() {
        let readers = Arc::new(ReaderTable::new(10));
        let handler = SmartcardConnectHandler::new(readers.clone());

        let client = ChannelClient::new(1, ChannelKind::Smartcard, 0, false, Box::new(NullStream));
        handler.on_connect(client.clone(), ChannelCapabilities::empty()).expect("connect failed");

        assert_eq!(readers.reader_for_client(1), None);
    }
}
