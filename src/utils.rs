// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Process-wide monotonic cookie generator for async-command bookkeeping.
///
/// Cookies only need to be unique per dispatcher instance while a command is
/// in flight; a single global counter is simpler than per-dispatcher state
/// and never wraps in practice (2^64 submissions).
static NEXT_COOKIE: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh 64-bit cookie for an async command.
pub fn next_cookie() -> u64 {
    NEXT_COOKIE.fetch_add(1, Ordering::Relaxed)
}

/// Process-wide monotonic id generator for dispatcher/channel registration.
static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Allocates a fresh small identifier (dispatcher ids, channel client ids).
pub fn next_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_are_unique_and_monotonic() {
        let a = next_cookie();
        let b = next_cookie();
        assert!(b > a);
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }
}
