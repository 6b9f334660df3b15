//! Thread-safety bounds that relax on single-threaded targets.
//!
//! Native builds share clocks, authorities and the key cache across tokio
//! worker threads, so those types must be `Send + Sync`. On
//! `wasm32-unknown-unknown` there is only one thread and browser futures are
//! not `Send`; there the bounds below are empty.

/// `Send` on native targets, no bound on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSend: Send {}

#[cfg(not(target_arch = "wasm32"))]
impl<S: Send> ConditionalSend for S {}

/// `Send + Sync` on native targets, no bound on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<S: Send + Sync> ConditionalSync for S {}

/// `Send` on native targets, no bound on `wasm32`.
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSend {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSend for S {}

/// `Send + Sync` on native targets, no bound on `wasm32`.
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSync {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSync for S {}

/// A value behind the cheapest lock the target allows: a
/// `parking_lot::RwLock` on native targets, a `RefCell` on `wasm32`.
///
/// ```
/// use sas_common::SharedCell;
///
/// let cell = SharedCell::new(1);
/// *cell.write() += 1;
/// assert_eq!(*cell.read(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SharedCell<T>(Inner<T>);

#[cfg(not(target_arch = "wasm32"))]
type Inner<T> = parking_lot::RwLock<T>;

#[cfg(target_arch = "wasm32")]
type Inner<T> = std::cell::RefCell<T>;

impl<T> SharedCell<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        Self(Inner::new(value))
    }

    /// Consume the cell, returning the value.
    pub fn into_inner(self) -> T {
        self.0.into_inner()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl<T> SharedCell<T> {
    /// Shared access; blocks while a writer holds the lock.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Exclusive access; blocks while any guard is held.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, T> {
        self.0.write()
    }
}

#[cfg(target_arch = "wasm32")]
impl<T> SharedCell<T> {
    /// Shared access.
    ///
    /// # Panics
    /// If a [`SharedCell::write`] guard is alive.
    pub fn read(&self) -> std::cell::Ref<'_, T> {
        self.0.borrow()
    }

    /// Exclusive access.
    ///
    /// # Panics
    /// If any other guard is alive.
    pub fn write(&self) -> std::cell::RefMut<'_, T> {
        self.0.borrow_mut()
    }
}
