// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Mouse-routing policy broadcast to every worker.
///
/// Mirrors the two modes a guest's tablet/mouse device can be driven in:
/// client-relative deltas, or absolute positions tied to the primary
/// surface's resolution.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MouseMode {
    Server,
    Client,
}

impl fmt::Display for MouseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MouseMode::Server => "server",
            MouseMode::Client => "client",
        })
    }
}

/// Image-compression mode requested by the client/administrator.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageCompression {
    Off,
    AutoGlz,
    AutoLz,
    Quic,
    Glz,
    Lz,
    Lz4,
}

impl fmt::Display for ImageCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageCompression::Off => "off",
            ImageCompression::AutoGlz => "auto_glz",
            ImageCompression::AutoLz => "auto_lz",
            ImageCompression::Quic => "quic",
            ImageCompression::Glz => "glz",
            ImageCompression::Lz => "lz",
            ImageCompression::Lz4 => "lz4",
        })
    }
}

/// Streaming-video heuristic mode.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamingVideo {
    Off,
    All,
    Filter,
}

impl StreamingVideo {
    pub fn as_bool(self) -> bool {
        !matches!(self, StreamingVideo::Off)
    }
}

impl fmt::Display for StreamingVideo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamingVideo::Off => "off",
            StreamingVideo::All => "all",
            StreamingVideo::Filter => "filter",
        })
    }
}

/// Kind of per-service endpoint a `Channel` multiplexes clients for.
///
/// Kept as an explicit, closed enum (rather than a registered runtime table)
/// because the dispatch tag shape for each kind is fixed at compile time.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Display,
    Cursor,
    Inputs,
    Smartcard,
}

impl ChannelKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Display => "display",
            ChannelKind::Cursor => "cursor",
            ChannelKind::Inputs => "inputs",
            ChannelKind::Smartcard => "smartcard",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
