//! A common Mutex interface, serializing every operation on a mounted
//! volume (spec.md §5).
//!
//! Nothing here implements poisoning! If a panic occurs while one of these
//! is locked, no guarantees are made about what happens next.
//!
//! Kept as a trait (rather than hardcoding `std::sync::Mutex`) so that a
//! target outside this crate's scope (spec.md §1 places the mount/unmount
//! driver glue out of scope) could supply its own implementation, the way
//! the teacher crate's `bare_metal`/`external_mutex` arms did for embedded
//! targets. Those two arms are dropped here along with `cfg-if`'s dispatch
//! between them — see DESIGN.md — since this crate only ever targets a
//! hosted environment.

pub trait MutexInterface<T>: Sync {
    fn new(inner: T) -> Self;

    /// Runs `func` in a critical section.
    fn cs<F: FnOnce(&mut T) -> R, R>(&self, func: F) -> R;

    /// Gets mutable access to the inner data using a mutable reference.
    /// Since Rust can statically prove exclusive access here, no locking
    /// occurs.
    fn get_mut(&mut self) -> &mut T;
}

impl<T: Send> MutexInterface<T> for std::sync::Mutex<T> {
    fn new(inner: T) -> Self {
        std::sync::Mutex::new(inner)
    }

    #[inline]
    fn cs<F: FnOnce(&mut T) -> R, R>(&self, func: F) -> R {
        let mut inner = self.lock().unwrap();
        func(&mut *inner)
    }

    #[inline]
    fn get_mut(&mut self) -> &mut T {
        std::sync::Mutex::get_mut(self).unwrap()
    }
}

pub type Mutex<T> = std::sync::Mutex<T>;
