use std::sync::{Condvar, Mutex};

struct LatchState {
    readers: usize,
    writer: bool,
}

/// A counting reader-writer latch whose acquire and release are decoupled
/// from guard lifetimes.
///
/// `std::sync::RwLock` guards cannot be stored past the acquiring scope
/// without infecting every holder with a lifetime, but the global
/// transaction latch is held from `begin` to `commit` across arbitrary
/// call stacks. This latch counts instead.
pub struct ReaderWriterLatch {
    state: Mutex<LatchState>,
    cond: Condvar,
}

impl ReaderWriterLatch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LatchState {
                readers: 0,
                writer: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn rlock(&self) {
        let mut state = self.state.lock().unwrap();
        while state.writer {
            state = self.cond.wait(state).unwrap();
        }
        state.readers += 1;
    }

    pub fn runlock(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.readers > 0);
        state.readers -= 1;
        if state.readers == 0 {
            self.cond.notify_all();
        }
    }

    pub fn wlock(&self) {
        let mut state = self.state.lock().unwrap();
        while state.writer || state.readers > 0 {
            state = self.cond.wait(state).unwrap();
        }
        state.writer = true;
    }

    pub fn wunlock(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.writer);
        state.writer = false;
        self.cond.notify_all();
    }
}
