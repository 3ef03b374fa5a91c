// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turn-taking that delivers committed events in commit order.
//!
//! Events are enqueued while the store write lock is held, so the queue
//! order is the commit order. Each entry is owned by the thread that
//! committed it. After releasing the store lock, that thread calls
//! [`DispatchQueue::deliver`] and waits until its entries reach the head
//! of the queue, then runs their callbacks itself. Callbacks therefore
//! stay on the emitting thread, and only one event is dispatched at a
//! time.
//!
//! A callback that emits re-enters on the dispatching thread. Its events
//! are queued behind everything already committed and delivered by the
//! outer `deliver` call before it returns.

use std::collections::VecDeque;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::event::Event;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<(ThreadId, Event)>,
    dispatcher: Option<ThreadId>,
}

impl QueueState {
    fn head_owned_by(&self, owner: ThreadId) -> bool {
        self.pending.front().is_some_and(|(o, _)| *o == owner)
    }

    fn owns_pending(&self, owner: ThreadId) -> bool {
        self.pending.iter().any(|(o, _)| *o == owner)
    }
}

#[derive(Debug, Default)]
pub(crate) struct DispatchQueue {
    state: Mutex<QueueState>,
    turn: Condvar,
}

impl DispatchQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends events owned by the current thread.
    pub(crate) fn enqueue(&self, events: impl IntoIterator<Item = Event>) {
        let owner = thread::current().id();
        let mut state = self.state.lock();
        state
            .pending
            .extend(events.into_iter().map(|event| (owner, event)));
    }

    /// Hands every event the current thread has queued to `dispatch`, in
    /// queue order, waiting for other threads' earlier events first.
    ///
    /// Must be called without holding the store lock. Returns at once when
    /// called from inside `dispatch` on the same thread.
    pub(crate) fn deliver<F>(&self, dispatch: F)
    where
        F: Fn(&Event),
    {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.dispatcher == Some(me) {
            return;
        }

        while state.owns_pending(me) {
            if state.dispatcher.is_none() && state.head_owned_by(me) {
                self.dispatch_head(&mut state, me, &dispatch);
            } else {
                self.turn.wait(&mut state);
            }
        }
    }

    fn dispatch_head<F>(
        &self,
        state: &mut MutexGuard<'_, QueueState>,
        me: ThreadId,
        dispatch: &F,
    ) where
        F: Fn(&Event),
    {
        let Some((_, event)) = state.pending.pop_front() else {
            return;
        };
        state.dispatcher = Some(me);
        MutexGuard::unlocked(state, || dispatch(&event));
        state.dispatcher = None;
        self.turn.notify_all();
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}
