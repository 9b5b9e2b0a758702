// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The channel and channel-client layer: process-wide
//! `(kind, id)`-keyed channels, each multiplexing connected clients over
//! an already-authenticated [`stream::ClientStream`].

pub mod channel;
pub mod client;
pub mod handlers;
pub mod pipe_item;
pub mod stream;

pub use channel::{Channel, ChannelCapabilities, ChannelConnectHandler, ChannelRegistry, MigrateMode};
pub use client::{ChannelClient, ChannelClientHandle};
pub use handlers::{GraphicsConnectHandler, SmartcardConnectHandler};
pub use pipe_item::PipeItem;
pub use stream::ClientStream;
