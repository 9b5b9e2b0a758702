// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The primary-surface lifecycle state machine:
//! `Absent -> Creating -> Active -> Destroying -> Absent`. Sync create/destroy
//! collapse `Creating`/`Destroying` to instantaneous by applying both the
//! entry and completion events back to back, matching
//! [`crate::device::dispatcher::DeviceDispatcher`]'s sync primary-surface
//! calls.
//!
//! This module is a standalone, side-effect-free model of the transition
//! table; [`DeviceDispatcher`](crate::device::dispatcher::DeviceDispatcher)
//! implements the same table directly over its mutex-guarded `PrimaryState`
//! rather than driving an instance of this type, for the same reason the
//! pending bitmask is a couple of atomic ops rather than a lock: the state
//! here is small enough that a dedicated object would only add indirection.
//! It is kept and tested in its own right because it is the precise
//! contract observers can rely on: commits are only ever visible as the
//! fully-active or fully-absent shape, never a half-applied one.

use tracing::warn;

use crate::{dispatch::queue::SurfaceSpec, state_machine::common::Transition};

/// A state in the primary-surface lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimarySurfaceState {
    #[default]
    Absent,
    Creating(SurfaceSpec),
    Active(SurfaceSpec),
    Destroying(SurfaceSpec),
}

/// Events that drive the lifecycle forward.
#[derive(Debug, Clone, Copy)]
pub enum PrimarySurfaceEvent {
    Create(SurfaceSpec),
    CreateComplete,
    Destroy,
    DestroyComplete,
}

impl PrimarySurfaceState {
    /// Applies `event`, returning the resulting transition.
    ///
    /// Out-of-order events (e.g. `CreateComplete` while `Absent`) are not a
    /// hard error: they are logged and the state stays put, consistent with
    /// this crate's forward-progress posture elsewhere.
    pub fn apply(self, event: PrimarySurfaceEvent) -> Transition<Self, ()> {
        use PrimarySurfaceEvent as E;
        use PrimarySurfaceState as S;

        match (self, event) {
            (S::Absent, E::Create(spec)) => Transition::Next(S::Creating(spec), ()),
            (S::Creating(spec), E::CreateComplete) => Transition::Next(S::Active(spec), ()),
            (S::Active(spec), E::Destroy) => Transition::Next(S::Destroying(spec), ()),
            (S::Destroying(_), E::DestroyComplete) => Transition::Next(S::Absent, ()),
            (state, event) => {
                warn!(?state, ?event, "out-of-order primary-surface transition, ignoring");
                Transition::Stay(())
            },
        }
    }

    /// Collapses `Creating` -> `Active` into one call, for the sync
    /// `create_primary_surface` form that stages and commits around a single
    /// blocking send.
    pub fn sync_create(spec: SurfaceSpec) -> Self {
        Self::Active(spec)
    }

    /// Collapses `Destroying` -> `Absent` into one call, for the sync
    /// `destroy_primary_surface` form.
    pub fn sync_destroy() -> Self {
        Self::Absent
    }

    /// `true` for every state except `Absent`: outside observers only ever
    /// see the fully-committed `Active` shape or the fully-reset `Absent`
    /// shape, but the in-flight states are still "not absent" for the
    /// purposes of e.g. a second concurrent create being rejected upstream.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Resolution is only ever reported from the `Active` state; every
    /// other state reports `(0, 0)`.
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Active(spec) => (spec.x_res, spec.y_res),
            _ => (0, 0),
        }
    }

    pub fn use_hw_cursor(self) -> bool {
        matches!(self, Self::Active(spec) if spec.use_hw_cursor)
    }
}
