// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The global readers table: assigns each new bridge a
//! monotonic `reader_id` and enforces the attach invariant across every
//! bridge the process knows about. Guarded with `RwLock`, matching
//! [`crate::device::registry::DispatcherRegistry`]'s posture for an
//! append-mostly collection read far more often than it is written.

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

use tracing::instrument;

use crate::{
    error::SmartcardError,
    smartcard::{bridge::CharDeviceBridge, device::CharDevice},
    utils::next_id,
};

/// Process-wide table of every live [`CharDeviceBridge`].
///
/// Enforces the half of the attach invariant that
/// `CharDeviceBridge::attach_client` alone can't: a client id attached to
/// one bridge can't simultaneously attach to a second one.
pub struct ReaderTable {
    max_readers: u32,
    bridges: RwLock<Vec<Arc<CharDeviceBridge>>>,
    attached_clients: RwLock<HashSet<u32>>,
}

impl ReaderTable {
    pub fn new(max_readers: u32) -> Self {
        Self {
            max_readers,
            bridges: RwLock::new(Vec::new()),
            attached_clients: RwLock::new(HashSet::new()),
        }
    }

    /// Registers a new reader's char device, assigning it the next
    /// monotonic `reader_id`. Returns `ReaderTableFull` if the table is
    /// already at capacity.
    pub fn add_reader(
        &self,
        device: Arc<dyn CharDevice>,
        initial_buf_size: usize,
    ) -> Result<Arc<CharDeviceBridge>, SmartcardError> {
        let mut bridges = self.bridges.write().expect("reader table poisoned");
        if bridges.len() >= self.max_readers as usize {
            return Err(SmartcardError::ReaderTableFull(self.max_readers));
        }
        let bridge = Arc::new(CharDeviceBridge::new(next_id(), device, initial_buf_size));
        bridges.push(bridge.clone());
        Ok(bridge)
    }

    /// Drops a reader from the table, detaching its client first if one
    /// is still attached.
    pub fn remove_reader(&self, reader_id: u32) {
        let bridge = {
            let mut bridges = self.bridges.write().expect("reader table poisoned");
            let idx = bridges.iter().position(|b| b.reader_id == reader_id);
            idx.map(|i| bridges.swap_remove(i))
        };
        if let Some(bridge) = bridge {
            self.detach(reader_id);
            drop(bridge);
        }
    }

    pub fn get(&self, reader_id: u32) -> Option<Arc<CharDeviceBridge>> {
        self.bridges
            .read()
            .expect("reader table poisoned")
            .iter()
            .find(|b| b.reader_id == reader_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.bridges.read().expect("reader table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every currently registered reader's id, in table order.
    pub fn reader_ids(&self) -> Vec<u32> {
        self.bridges
            .read()
            .expect("reader table poisoned")
            .iter()
            .map(|b| b.reader_id)
            .collect()
    }

    /// The first reader with no attached client, if any. A newly connected
    /// smartcard client attaches to the first unattached reader.
    pub fn first_unattached(&self) -> Option<u32> {
        self.bridges
            .read()
            .expect("reader table poisoned")
            .iter()
            .find(|b| !b.is_attached())
            .map(|b| b.reader_id)
    }

    /// The reader id `client_id` is currently attached to, if any.
    pub fn reader_for_client(&self, client_id: u32) -> Option<u32> {
        self.bridges
            .read()
            .expect("reader table poisoned")
            .iter()
            .find(|b| b.attached_client().map(|c| c.id) == Some(client_id))
            .map(|b| b.reader_id)
    }

    /// Attaches `client` (identified by `client_id`) to the bridge for
    /// `reader_id` . Rejects the attach if either side already has a
    /// counterpart: the client is already attached elsewhere, or the
    /// bridge already has a client.
    #[instrument(skip(self, client))]
    pub fn attach(
        &self,
        reader_id: u32,
        client_id: u32,
        client: crate::channel::client::ChannelClientHandle,
    ) -> Result<(), SmartcardError> {
        let bridge = self.get(reader_id).ok_or(SmartcardError::DoubleAttach)?;

        {
            let mut attached = self.attached_clients.write().expect("reader table poisoned");
            if attached.contains(&client_id) {
                return Err(SmartcardError::DoubleAttach);
            }
            attached.insert(client_id);
        }

        if let Err(e) = bridge.attach_client(client) {
            self.attached_clients
                .write()
                .expect("reader table poisoned")
                .remove(&client_id);
            return Err(e);
        }
        Ok(())
    }

    /// Detaches whatever client is attached to `reader_id`'s bridge, if
    /// any (idempotent: a second call is a no-op).
    pub fn detach(&self, reader_id: u32) {
        let Some(bridge) = self.get(reader_id) else {
            return;
        };
        if let Some(client) = bridge.detach_client() {
            self.attached_clients
                .write()
                .expect("reader table poisoned")
                .remove(&client.id);
        }
    }

    fn snapshot(&self) -> Vec<Arc<CharDeviceBridge>> {
        self.bridges.read().expect("reader table poisoned").clone()
    }

    /// Drains one non-blocking read cycle from every attached bridge,
    /// dispatching completed messages to each bridge's attached client
    /// . Bridges with no attached client are skipped.
    pub fn poll_all(&self) -> Vec<(u32, Result<(), SmartcardError>)> {
        let mut results = Vec::new();
        for bridge in self.snapshot() {
            let Some(client) = bridge.attached_client() else {
                continue;
            };
            loop {
                match bridge.read_one_msg_from_device() {
                    Ok(Some(item)) => {
                        client.pipe_add_push(crate::channel::pipe_item::PipeItem::SmartcardData(item));
                    },
                    Ok(None) => {
                        results.push((bridge.reader_id, Ok(())));
                        break;
                    },
                    Err(e) => {
                        results.push((bridge.reader_id, Err(e)));
                        break;
                    },
                }
            }
        }
        results
    }
}
