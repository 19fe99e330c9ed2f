//! Sessions: per-caller cursors over a shared device
//!
//! Every operation takes the device's access gate, does its work on the
//! store and releases the gate before returning, on success and on error
//! alike. Nothing spans two operations: a seek followed by a read from the
//! same session may see another session's write in between.

use std::fmt;
use std::sync::{Arc, Weak};

use embedded_io_async::{ErrorType, Read, Seek, Write};
use tracing::{debug, trace, warn};

use crate::device::DeviceState;
use crate::error::StoreError;
use crate::gate::Interrupt;
use crate::idgen::SessionId;
use crate::io::{OpenMode, SeekFrom};

/// Resolve a seek request against the current cursor and data size.
///
/// The target must land on an existing byte: anything negative or at or
/// past `size` is out of range. `End(d)` resolves to `size - 1 + d`, so
/// `End(0)` is the last byte and no positive delta can pass the bound.
///
/// # Errors
///
/// Returns [`StoreError::OutOfRange`] if the target is not in `[0, size)`.
pub fn seek_target(cursor: usize, size: usize, pos: SeekFrom) -> Result<usize, StoreError> {
    let size_wide = size as i128;
    let target = match pos {
        SeekFrom::Start(offset) => i128::from(offset),
        SeekFrom::Current(delta) => cursor as i128 + i128::from(delta),
        SeekFrom::End(delta) => size_wide - 1 + i128::from(delta),
    };

    if target < 0 || target >= size_wide {
        return Err(StoreError::out_of_range(target, size));
    }
    usize::try_from(target).map_err(|_| StoreError::out_of_range(target, size))
}

/// An open handle on a device with its own cursor
///
/// # Thread Safety
///
/// - Operations take `&mut self`, so one session runs one operation at a time.
/// - Different sessions are independent and may run on different tasks; the
///   device's gate serializes them.
/// - The session holds a weak reference: it never keeps a torn-down device
///   alive, and operations on it then fail with [`StoreError::NoDevice`].
pub struct Session {
    id: SessionId,
    device: Weak<DeviceState>,
    mode: OpenMode,
    cursor: usize,
    interrupt: Interrupt,
    closed: bool,
}

impl Session {
    pub(crate) fn new(id: SessionId, device: Weak<DeviceState>, mode: OpenMode) -> Self {
        Self {
            id,
            device,
            mode,
            cursor: 0,
            interrupt: Interrupt::new(),
            closed: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Current cursor, read without taking the gate
    #[must_use]
    pub fn tell(&self) -> usize {
        self.cursor
    }

    /// A handle to this session's interrupt signal.
    ///
    /// Raising it while an operation waits for the gate makes that operation
    /// fail with [`StoreError::Interrupted`].
    #[must_use]
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn device(&self) -> Result<Arc<DeviceState>, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.device.upgrade().ok_or(StoreError::NoDevice)
    }

    /// Write `buf` at the cursor and advance the cursor.
    ///
    /// In [`OpenMode::Append`] the cursor is first moved to the end of the
    /// data. Returns the number of bytes written, which is less than
    /// `buf.len()` if the store could not grow enough.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OutOfRange`] if the cursor is past the end of the data
    /// - [`StoreError::Interrupted`] if the wait for the gate was interrupted
    /// - [`StoreError::Closed`] / [`StoreError::NoDevice`]
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError> {
        let device = self.device()?;
        let mut store = device.gate.acquire(&self.interrupt).await?;

        let offset = match self.mode {
            OpenMode::Append => store.size(),
            OpenMode::ReadWrite => self.cursor,
        };
        let written = store.write_at(offset, buf)?;
        drop(store);

        self.cursor = offset + written;
        if written < buf.len() {
            warn!(session = self.id.id(), written, requested = buf.len(), "short write");
        } else {
            trace!(session = self.id.id(), offset, written, "write");
        }
        Ok(written)
    }

    /// Read into `buf` from the cursor and advance the cursor.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` if
    /// the data ends first.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OutOfRange`] if the cursor is at or past the end of the data
    /// - [`StoreError::Interrupted`] if the wait for the gate was interrupted
    /// - [`StoreError::Closed`] / [`StoreError::NoDevice`]
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StoreError> {
        let device = self.device()?;
        let store = device.gate.acquire(&self.interrupt).await?;

        let offset = self.cursor;
        let read = store.read_at(offset, buf)?;
        drop(store);

        self.cursor = offset + read;
        trace!(session = self.id.id(), offset, read, "read");
        Ok(read)
    }

    /// Move the cursor, see [`seek_target`]. Returns the new cursor.
    ///
    /// On error the cursor is left where it was.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OutOfRange`] if the target is not an existing byte
    /// - [`StoreError::Interrupted`] if the wait for the gate was interrupted
    /// - [`StoreError::Closed`] / [`StoreError::NoDevice`]
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<usize, StoreError> {
        let device = self.device()?;
        let store = device.gate.acquire(&self.interrupt).await?;
        let target = seek_target(self.cursor, store.size(), pos);
        drop(store);

        let target = target.inspect_err(|e| {
            debug!(session = self.id.id(), ?pos, error = %e, "seek rejected");
        })?;
        self.cursor = target;
        Ok(target)
    }

    /// Detach from the device. Later operations fail with [`StoreError::Closed`].
    pub fn close(&mut self) {
        if self.closed {
            warn!("Session::close() called on already closed session: {self:?}");
            return;
        }
        self.closed = true;
        if let Some(device) = self.device.upgrade() {
            device.detach(self.id);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session(id={}, mode={:?}, cursor={}, closed={})",
            self.id.id(),
            self.mode,
            self.cursor,
            self.closed
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            self.close();
        }
    }
}

// Implement embedded_io_async traits
impl ErrorType for Session {
    type Error = StoreError;
}

impl Read for Session {
    /// Reading at the end of the data reports EOF (`Ok(0)`) here instead of
    /// [`StoreError::OutOfRange`], so generic readers stop cleanly.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match Session::read(self, buf).await {
            Err(StoreError::OutOfRange { .. }) => Ok(0),
            other => other,
        }
    }
}

impl Write for Session {
    /// A full store is reported as an error: `Ok(0)` for a non-empty buffer
    /// would make `write_all` spin.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let written = Session::write(self, buf).await?;
        if written == 0 && !buf.is_empty() {
            return Err(StoreError::AllocationExhausted {
                requested: self.cursor.saturating_add(buf.len()),
            });
        }
        Ok(written)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Seek for Session {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let cursor = Session::seek(self, pos).await?;
        Ok(cursor as u64)
    }
}
