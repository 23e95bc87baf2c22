//! Teardown signal for a session's script
//!
//! A script thread can be parked in a backoff sleep or in the wait for an
//! `exec` child. Raising the interrupt wakes every sleeper and kills every
//! tracked child, so `close` never waits on work nobody needs anymore.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::pty::Killer;

/// Shared, one-way cancellation flag plus the children it must stop
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    wake: Condvar,
}

#[derive(Default)]
struct State {
    raised: bool,
    next_id: u64,
    children: BTreeMap<u64, Killer>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_raised(&self) -> bool {
        self.lock().raised
    }

    /// Kill every tracked child and wake every sleeper; later calls do nothing
    pub fn raise(&self) {
        let mut state = self.lock();
        if state.raised {
            return;
        }
        state.raised = true;
        let children = std::mem::take(&mut state.children);
        drop(state);
        self.inner.wake.notify_all();

        for (_, mut killer) in children {
            if let Err(e) = killer.kill() {
                tracing::debug!(error = %e, "interrupted child already gone");
            }
        }
    }

    /// Sleep for `duration` unless raised first
    ///
    /// Returns `false` when the sleep was cut short (or never started).
    pub fn sleep(&self, duration: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .inner
            .wake
            .wait_timeout_while(state, duration, |s| !s.raised)
            .unwrap_or_else(PoisonError::into_inner);
        !state.raised
    }

    /// Kill `killer`'s process when raised, until the guard is dropped
    ///
    /// Tracking a child after the interrupt was raised kills it at once.
    pub fn track(&self, mut killer: Killer) -> Tracked {
        let mut state = self.lock();
        if state.raised {
            drop(state);
            if let Err(e) = killer.kill() {
                tracing::debug!(error = %e, "late child already gone");
            }
            return Tracked { interrupt: None, id: 0 };
        }
        let id = state.next_id;
        state.next_id += 1;
        state.children.insert(id, killer);
        Tracked {
            interrupt: Some(self.clone()),
            id,
        }
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Interrupt")
            .field("raised", &state.raised)
            .field("children", &state.children.len())
            .finish()
    }
}

/// Registration of a child with an [`Interrupt`]; untracks on drop
pub struct Tracked {
    interrupt: Option<Interrupt>,
    id: u64,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if let Some(interrupt) = &self.interrupt {
            interrupt.lock().children.remove(&self.id);
        }
    }
}
