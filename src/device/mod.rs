// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The device dispatcher (DD) and the process-wide fan-out controller (G)
//! that sits on top of it.

pub mod dispatcher;
pub mod guest;
pub mod registry;

pub use dispatcher::{DeviceDispatcher, DispatcherId, PrimaryState};
pub use guest::{GuestDevice, WorkerCallbacks};
pub use registry::DispatcherRegistry;
