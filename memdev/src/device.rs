//! Device lifecycle and the registry of named access points
//!
//! A [`Device`] owns one byte store behind one access gate. It is created
//! with [`Device::init`], which allocates the store and registers the
//! device under a name, and destroyed with [`Device::teardown`] (or by
//! dropping it), which unregisters the name and releases the store.
//!
//! Sessions only hold weak references, so teardown is never delayed by
//! a session that is left open.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::gate::{AccessGate, GateGuard, Interrupt};
use crate::idgen::{DevNo, IdGen, SessionId};
use crate::io::{ByteStore, OpenMode, StoreStats};
use crate::session::Session;

/// State shared between a device and its sessions
pub(crate) struct DeviceState {
    name: String,
    pub(crate) gate: AccessGate<ByteStore>,
    session_ids: IdGen,
    open_sessions: AtomicUsize,
}

impl DeviceState {
    fn new(name: &str, store: ByteStore) -> Self {
        Self {
            name: name.to_string(),
            gate: AccessGate::new(store),
            session_ids: IdGen::new(),
            open_sessions: AtomicUsize::new(0),
        }
    }

    fn attach(self: &Arc<Self>, mode: OpenMode) -> Session {
        let id = SessionId::new(self.session_ids.get_next());
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        debug!(device = %self.name, session = id.id(), ?mode, "session opened");
        Session::new(id, Arc::downgrade(self), mode)
    }

    pub(crate) fn detach(&self, id: SessionId) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!(device = %self.name, session = id.id(), "session closed");
    }

    fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

struct Entry {
    devno: DevNo,
    state: Weak<DeviceState>,
}

/// Table of registered devices, indexed by name
///
/// Device numbers are never reused within one registry.
pub struct Registry {
    devices: Mutex<HashMap<String, Entry>>,
    devnos: IdGen,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            devnos: IdGen::new(),
        }
    }

    fn register(&self, name: &str, state: &Arc<DeviceState>) -> Result<DevNo, StoreError> {
        let mut devices = self.devices.lock();
        if devices.contains_key(name) {
            return Err(StoreError::AlreadyRegistered(name.to_string()));
        }
        let devno = DevNo::new(self.devnos.get_next());
        devices.insert(
            name.to_string(),
            Entry {
                devno,
                state: Arc::downgrade(state),
            },
        );
        Ok(devno)
    }

    fn unregister(&self, name: &str) {
        if self.devices.lock().remove(name).is_none() {
            warn!(device = name, "unregister: device not registered");
        }
    }

    /// Open a session on the device registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no live device has that name.
    pub fn open(&self, name: &str, mode: OpenMode) -> Result<Session, StoreError> {
        let state = self
            .devices
            .lock()
            .get(name)
            .and_then(|entry| entry.state.upgrade())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(state.attach(mode))
    }

    /// Device number of `name`, if registered
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<DevNo> {
        self.devices.lock().get(name).map(|entry| entry.devno)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered in-memory byte store
pub struct Device {
    state: Arc<DeviceState>,
    devno: DevNo,
    registry: Arc<Registry>,
    released: bool,
}

impl Device {
    /// Allocate a store as described by `config` and register it as `name`.
    ///
    /// If registration fails, the freshly allocated store is released again.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidConfig`] for an inconsistent configuration
    /// - [`StoreError::AllocationExhausted`] if the initial region cannot be allocated
    /// - [`StoreError::AlreadyRegistered`] if `name` is taken
    pub fn init(
        registry: &Arc<Registry>,
        name: &str,
        config: &StoreConfig,
    ) -> Result<Self, StoreError> {
        let store = ByteStore::new(config).inspect_err(|e| {
            error!(device = name, error = %e, "cannot create store");
        })?;
        let capacity = store.capacity();

        let state = Arc::new(DeviceState::new(name, store));
        let devno = registry.register(name, &state).inspect_err(|e| {
            error!(device = name, error = %e, "cannot register device");
        })?;

        info!(device = name, %devno, capacity, "device registered");
        Ok(Self {
            state,
            devno,
            registry: Arc::clone(registry),
            released: false,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    #[must_use]
    pub fn devno(&self) -> DevNo {
        self.devno
    }

    /// Open a new session with its cursor at 0
    #[must_use]
    pub fn open(&self, mode: OpenMode) -> Session {
        self.state.attach(mode)
    }

    /// Number of sessions opened and not yet closed
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.state.open_sessions()
    }

    /// Take the access gate and return the store guard.
    ///
    /// Every session operation waits until the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Interrupted`] if the wait was interrupted.
    pub async fn lock(&self, interrupt: &Interrupt) -> Result<GateGuard<'_, ByteStore>, StoreError> {
        self.state.gate.acquire(interrupt).await
    }

    /// Read the store counters under the access gate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Interrupted`] if the wait was interrupted.
    pub async fn stat(&self, interrupt: &Interrupt) -> Result<StoreStats, StoreError> {
        let store = self.lock(interrupt).await?;
        Ok(StoreStats {
            size: store.size(),
            capacity: store.capacity(),
            order: store.order(),
            open_sessions: self.open_sessions(),
        })
    }

    /// Unregister the device and release its store
    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.unregister(&self.state.name);

        let open = self.state.open_sessions();
        if open > 0 {
            warn!(device = %self.state.name, open, "tearing down with open sessions");
        }
        info!(device = %self.state.name, devno = %self.devno, "device unregistered");
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device(name={}, devno={}, open_sessions={}, released={})",
            self.state.name,
            self.devno,
            self.state.open_sessions(),
            self.released
        )
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.release();
    }
}
