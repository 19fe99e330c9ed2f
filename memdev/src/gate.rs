//! Access gate
//!
//! An exclusive lock around the byte store. Holders are served in the
//! order they started waiting. A wait can be cut short by raising the
//! caller's [`Interrupt`]; the caller then gets [`StoreError::Interrupted`]
//! and nothing has been taken.
//!
//! Waiting on an interrupt uses the check-register-check pattern:
//!
//! ```ignore
//! loop {
//!     let notified = notify.notified();   // register first
//!     if flag.load() { return; }          // then check
//!     notified.await;                     // a raise in between is not lost
//! }
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::error::StoreError;

struct InterruptState {
    raised: AtomicBool,
    notify: Notify,
}

/// Cancellation signal for a blocked gate acquisition
///
/// Clones share the same signal, so one clone can be handed to whoever
/// should be able to interrupt the owner of another.
#[derive(Clone)]
pub struct Interrupt {
    inner: Arc<InterruptState>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InterruptState {
                raised: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Raise the signal and wake everyone waiting on it
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Lower the signal without waking anyone
    pub fn clear(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Lower the signal, returning whether it was raised
    fn take(&self) -> bool {
        self.inner.raised.swap(false, Ordering::SeqCst)
    }

    /// Resolve once the signal is raised
    async fn raised(&self) {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interrupt(raised={})", self.is_raised())
    }
}

/// Exclusive, interruptible lock owning the guarded value
pub struct AccessGate<T> {
    inner: Mutex<T>,
}

impl<T> AccessGate<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Take the gate, waiting if someone else holds it.
    ///
    /// Only a wait can be interrupted: a free gate is taken even if
    /// `interrupt` is raised. If `interrupt` is raised while waiting, the wait
    /// is abandoned. Either way the signal is consumed by this call and never
    /// carries over to a later one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Interrupted`] if the wait was interrupted.
    pub async fn acquire(&self, interrupt: &Interrupt) -> Result<GateGuard<'_, T>, StoreError> {
        if let Ok(guard) = self.inner.try_lock() {
            interrupt.take();
            return Ok(GateGuard(guard));
        }

        log::trace!("gate: held, waiting");
        tokio::select! {
            biased;
            () = interrupt.raised() => {
                interrupt.take();
                log::debug!("gate: wait interrupted");
                Err(StoreError::Interrupted)
            }
            guard = self.inner.lock() => {
                interrupt.take();
                Ok(GateGuard(guard))
            }
        }
    }

    /// Take the gate only if it is free right now
    #[must_use]
    pub fn try_acquire(&self) -> Option<GateGuard<'_, T>> {
        self.inner.try_lock().ok().map(GateGuard)
    }

    /// Consume the gate, returning the guarded value
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Proof of holding the gate; the gate is released when this is dropped
pub struct GateGuard<'a, T>(MutexGuard<'a, T>);

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
