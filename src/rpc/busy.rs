//! Busy lock — serialises exclusive commands on one link session.
//!
//! At most one exclusive command holds the lock. The dispatcher is the
//! only writer: it acquires before invoking an exclusive handler and
//! the returned [`BusyGuard`] releases on every exit path. Handlers get
//! a read-only [`BusyView`].
//!
//! A link teardown force-releases the lock. Each acquisition carries a
//! generation number so a guard outliving a teardown never releases a
//! newer holder.

use core::cell::{Cell, RefCell};
use std::rc::Rc;

/// Who holds the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub command: &'static str,
    pub id: String,
}

struct Slot {
    holder: Holder,
    generation: u64,
}

#[derive(Default)]
struct LockState {
    slot: RefCell<Option<Slot>>,
    generation: Cell<u64>,
}

#[derive(Clone, Default)]
pub struct BusyLock {
    state: Rc<LockState>,
}

impl BusyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or report the current holder.
    pub(crate) fn try_acquire(&self, command: &'static str, id: &str) -> Result<BusyGuard, Holder> {
        let mut slot = self.state.slot.borrow_mut();
        if let Some(current) = slot.as_ref() {
            return Err(current.holder.clone());
        }

        let generation = self.state.generation.get().wrapping_add(1);
        self.state.generation.set(generation);
        *slot = Some(Slot {
            holder: Holder {
                command,
                id: id.to_string(),
            },
            generation,
        });

        Ok(BusyGuard {
            lock: self.clone(),
            generation,
        })
    }

    /// Release regardless of holder (link teardown).
    pub(crate) fn force_release(&self) -> Option<Holder> {
        self.state.slot.borrow_mut().take().map(|s| s.holder)
    }

    pub fn holder(&self) -> Option<Holder> {
        self.state.slot.borrow().as_ref().map(|s| s.holder.clone())
    }

    pub fn is_held(&self) -> bool {
        self.state.slot.borrow().is_some()
    }

    pub fn view(&self) -> BusyView {
        BusyView { lock: self.clone() }
    }

    fn release(&self, generation: u64) {
        let mut slot = self.state.slot.borrow_mut();
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            *slot = None;
        }
    }
}

/// RAII release of an acquired [`BusyLock`].
pub struct BusyGuard {
    lock: BusyLock,
    generation: u64,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.lock.release(self.generation);
    }
}

/// Observer handle for handlers (status reporting).
#[derive(Clone)]
pub struct BusyView {
    lock: BusyLock,
}

impl BusyView {
    pub fn holder(&self) -> Option<Holder> {
        self.lock.holder()
    }
}

// ── Tests ────────────────────────────────────────────────────
