// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The channel registry: process-wide `(kind, id)` lookup of
//! live [`Channel`]s, each owning its connected [`ChannelClient`]s and
//! dispatching new connections to a per-kind [`ChannelConnectHandler`].

use std::sync::{Arc, RwLock};

use tracing::instrument;

use crate::{
    cfg::enums::ChannelKind,
    channel::{client::ChannelClientHandle, stream::ClientStream},
    error::ChannelError,
};

bitflags::bitflags! {
    /// Capabilities a connecting client negotiates with a channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelCapabilities: u32 {
        /// The client understands `MigrateData` pipe items.
        const MIGRATION = 0b0000_0001;
        /// The client accepts the zero-message initial ACK window the
        /// smartcard channel requests at connect time.
        const ACK_WINDOW = 0b0000_0010;
    }
}

/// Whether a channel accepts live-migration blobs from a reconnecting
/// client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrateMode {
    #[default]
    Disabled,
    Enabled,
}

/// Per-channel-kind connect callback: for the graphics channels,
/// constructs dispatch-backed worker callbacks and enqueues a connect
/// message; for the smartcard channel, constructs the client, requests a
/// zero-message ACK window, and attaches the first unattached reader.
///
/// An object-safe trait, parallel to [`crate::channel::stream::ClientStream`]:
/// `Channel` stores one `Box<dyn ChannelConnectHandler>` per registered
/// channel kind's own connect override.
pub trait ChannelConnectHandler: Send + Sync {
    fn on_connect(
        &self,
        client: ChannelClientHandle,
        caps: ChannelCapabilities,
    ) -> Result<(), ChannelError>;

    /// Called when a client disconnects, after its pipe has been cleared:
    /// disconnect cancels only not-yet-sent items.
    fn on_disconnect(&self, client: ChannelClientHandle);
}

/// One registered `(kind, id)` endpoint.
pub struct Channel {
    pub kind: ChannelKind,
    pub id: u32,
    pub capabilities: ChannelCapabilities,
    pub migrate_mode: MigrateMode,
    clients: RwLock<Vec<ChannelClientHandle>>,
    handler: Box<dyn ChannelConnectHandler>,
}

impl Channel {
    pub fn new(
        kind: ChannelKind,
        id: u32,
        capabilities: ChannelCapabilities,
        migrate_mode: MigrateMode,
        handler: Box<dyn ChannelConnectHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            id,
            capabilities,
            migrate_mode,
            clients: RwLock::new(Vec::new()),
            handler,
        })
    }

    pub fn is_migratable(&self) -> bool {
        self.migrate_mode == MigrateMode::Enabled
    }

    /// Accepts a newly authenticated stream. The link handshake itself is
    /// an external collaborator — by the time this is called, `stream` is
    /// already authenticated. Builds the `ChannelClient`, hands it to this
    /// channel's connect handler, and registers it on success.
    #[instrument(skip(self, stream))]
    pub fn accept(
        &self,
        stream: Box<dyn ClientStream>,
        client_id: u32,
        caps: ChannelCapabilities,
    ) -> Result<ChannelClientHandle, ChannelError> {
        let migratable = self.is_migratable() && caps.contains(ChannelCapabilities::MIGRATION);
        let client = crate::channel::client::ChannelClient::new(
            client_id,
            self.kind,
            self.id,
            migratable,
            stream,
        );

        self.handler.on_connect(client.clone(), caps)?;
        self.clients.write().expect("channel clients poisoned").push(client.clone());
        Ok(client)
    }

    pub fn disconnect(&self, client_id: u32) {
        let removed = {
            let mut clients = self.clients.write().expect("channel clients poisoned");
            let idx = clients.iter().position(|c| c.id == client_id);
            idx.map(|i| clients.swap_remove(i))
        };
        if let Some(client) = removed {
            client.disconnect();
            self.handler.on_disconnect(client);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().expect("channel clients poisoned").len()
    }

    pub fn clients(&self) -> Vec<ChannelClientHandle> {
        self.clients.read().expect("channel clients poisoned").clone()
    }
}

/// Process-wide registry of every live [`Channel`], keyed by `(kind,
/// id)`. At most one channel is allowed per `(kind, id)`.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<Vec<Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new channel. Rejects a second registration for an
    /// already-occupied `(kind, id)`.
    pub fn register(&self, channel: Arc<Channel>) -> Result<(), ChannelError> {
        let mut channels = self.channels.write().expect("channel registry poisoned");
        if channels.iter().any(|c| c.kind == channel.kind && c.id == channel.id) {
            return Err(ChannelError::DuplicateChannel {
                kind: channel.kind.as_str(),
                id: channel.id,
            });
        }
        channels.push(channel);
        Ok(())
    }

    pub fn unregister(&self, kind: ChannelKind, id: u32) {
        self.channels
            .write()
            .expect("channel registry poisoned")
            .retain(|c| !(c.kind == kind && c.id == id));
    }

    pub fn lookup(&self, kind: ChannelKind, id: u32) -> Result<Arc<Channel>, ChannelError> {
        self.channels
            .read()
            .expect("channel registry poisoned")
            .iter()
            .find(|c| c.kind == kind && c.id == id)
            .cloned()
            .ok_or(ChannelError::UnknownChannel { kind: kind.as_str(), id })
    }

    pub fn len(&self) -> usize {
        self.channels.read().expect("channel registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
