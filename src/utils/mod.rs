//! Small runtime utilities: cancellation, deferred values, id generation.

pub mod cancel;
pub mod deferred;
pub mod id;

pub use cancel::CancelHandle;
pub use deferred::Deferred;
pub use id::{IdGenerator, create_id_generator, sequential_id_generator};

use std::sync::{Mutex, MutexGuard};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
