// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub enum Transition<S, R> {
    Next(S, R),
    Stay(R),
    Done(R),
}

pub trait StateMachine<Ctx, RespCtx>: Sized {
    type StepResult<'a>: Future<Output = RespCtx> + Send + 'a
    where
        Self: 'a,
        RespCtx: 'a,
        Ctx: 'a;

    fn step<'a>(&'a self, ctx: &'a mut Ctx) -> Self::StepResult<'a>;
}

/// Drives a [`StateMachine`] to completion, yielding the final response
/// context once a state's `step` reports it is done.
///
/// An exchange that awaits a socket read between steps implements this by
/// taking the current state, `step`-ing it, and folding
/// `Transition::Next`/`Stay`/`Done` back into the loop. The dispatch fabric's
/// own state machines ([`crate::state_machine::primary_surface`],
/// [`crate::state_machine::bridge_read`]) are simpler, synchronous bookkeeping
/// transitions and drive themselves with plain `apply` calls rather than this
/// trait — it exists here reserved for future exchanges that actually await
/// I/O mid-transition (e.g. a link-handshake driver), none of which this
/// crate implements yet.
pub trait StateMachineCtx<Ctx, Res> {
    fn execute(
        &mut self,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> impl Future<Output = anyhow::Result<Res>> + Send;
}
