//! Cancellation tokens for dispatched work.
//!
//! A token fires once and stays fired. Any number of tasks may await
//! [`CancelToken::cancelled`]; all of them wake when it fires. The
//! dispatcher fires a handler's token when its deadline expires or the
//! link session ends.

use core::cell::{Cell, RefCell};
use core::future::poll_fn;
use core::task::{Poll, Waker};
use std::rc::Rc;

#[derive(Default)]
struct TokenState {
    fired: Cell<bool>,
    waiters: RefCell<Vec<Waker>>,
}

#[derive(Clone, Default)]
pub struct CancelToken {
    state: Rc<TokenState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if self.state.fired.replace(true) {
            return;
        }
        for waker in self.state.waiters.borrow_mut().drain(..) {
            waker.wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.fired.get()
    }

    /// Resolves once the token fires.
    pub async fn cancelled(&self) {
        poll_fn(|cx| {
            if self.state.fired.get() {
                return Poll::Ready(());
            }
            let mut waiters = self.state.waiters.borrow_mut();
            if !waiters.iter().any(|w| w.will_wake(cx.waker())) {
                waiters.push(cx.waker().clone());
            }
            Poll::Pending
        })
        .await;
    }
}

// ── Tests ────────────────────────────────────────────────────
