// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod bridge_read;
pub mod common;
pub mod primary_surface;
