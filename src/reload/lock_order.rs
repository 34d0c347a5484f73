//! Lock ordering
//!
//! The only place the coordinator takes its state lock on a path that may
//! compile. The host compilation lock always comes first, the state lock
//! second; the host may call back into us while holding its lock, so taking
//! them the other way round deadlocks.

use parking_lot::{ReentrantMutex, RwLock, RwLockUpgradableReadGuard};

pub struct LockOrder<'a, T> {
    host: &'a ReentrantMutex<()>,
    state: &'a RwLock<T>,
}

impl<'a, T> LockOrder<'a, T> {
    pub fn new(host: &'a ReentrantMutex<()>, state: &'a RwLock<T>) -> Self {
        Self { host, state }
    }

    /// Host lock, then an upgradeable read on the state
    pub fn exclusive<R>(&self, f: impl FnOnce(RwLockUpgradableReadGuard<'_, T>) -> R) -> R {
        let _host = self.host.lock();
        f(self.state.upgradable_read())
    }

    /// Host lock, then a shared read on the state
    pub fn shared<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _host = self.host.lock();
        let state = self.state.read();
        f(&state)
    }
}
