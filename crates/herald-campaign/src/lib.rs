//! # herald-campaign
//!
//! The messaging orchestration core: the session lifecycle, the campaign
//! job processor, and the reporter both push events through.

pub mod processor;
pub mod reporter;
pub mod session;

#[cfg(test)]
mod testing;

pub use processor::JobProcessor;
pub use reporter::Reporter;
pub use session::SessionManager;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
