// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The character-device smartcard bridge: length-prefixed framing over a
//! host char device, reassembled into pipe items for a channel client,
//! with live-migration support.

pub mod bridge;
pub mod device;
pub mod header;
pub mod migrate;
pub mod reader_table;
pub mod write_buffer;

pub use bridge::CharDeviceBridge;
pub use device::CharDevice;
pub use header::VscHeader;
pub use reader_table::ReaderTable;
pub use write_buffer::WriteBuffer;
