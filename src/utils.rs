use std::{
    sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

mod number;

pub use number::ceil_div;

pub use crate::log::init_log;

/// copy from https://github.com/tikv/tikv/blob/b15ea3b1cd766375cb52019e35c195ed797124df/components/tikv_util/src/lib.rs#L171-L186
///
/// A handy shortcut to replace `RwLock` write/read().unwrap() pattern to
/// shortcut wl and rl.
///
/// A poisoned lock means another thread panicked while mutating the
/// page, there is nothing sensible to recover, so we panic as well.
pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}

/// Same as `HandyRwLock`, for `Mutex`.
pub trait HandyMutex<T> {
    fn ml(&self) -> MutexGuard<'_, T>;
}

impl<T> HandyMutex<T> for Mutex<T> {
    fn ml(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap()
    }
}
