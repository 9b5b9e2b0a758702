// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-client byte-stream seam . The link handshake (capability
//! exchange, auth mechanism selection, and the optional SASL security
//! layer) is an external collaborator this crate does not implement; a
//! `ClientStream` is the already-authenticated transport `Channel::on_connect`
//! receives, wrapping a plain TCP socket or a SASL-encoded one identically
//! from the channel layer's point of view.

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe async read/write/shutdown seam for a connected client.
///
/// Boxed futures rather than native `async fn` in the trait: `ChannelClient`
/// stores `Box<dyn ClientStream>` per the data model , which requires
/// object safety that native async trait methods don't yet provide.
pub trait ClientStream: Send + Sync {
    fn write_all<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, std::io::Result<()>>;

    fn shutdown(&mut self) -> BoxFuture<'_, std::io::Result<()>>;
}
