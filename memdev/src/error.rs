//! Error type shared by the store, the gate, sessions and the registry

use embedded_io_async::ErrorKind;

/// Errors returned by memdev operations
///
/// Short reads and short writes are not errors: they are reported as a
/// byte count smaller than requested.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Waiting for the access gate was interrupted; nothing changed, retry the call
    #[error("interrupted while waiting for the access gate")]
    Interrupted,

    /// Offset or seek target outside the valid data
    #[error("position {position} out of range (size {size})")]
    OutOfRange { position: i128, size: usize },

    /// The allocator refused a region of the requested size
    #[error("cannot allocate {requested} bytes")]
    AllocationExhausted { requested: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("device '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("device '{0}' not found")]
    NotFound(String),

    /// The device behind the session was torn down
    #[error("device is gone")]
    NoDevice,

    #[error("session is closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn out_of_range(position: impl Into<i128>, size: usize) -> Self {
        Self::OutOfRange {
            position: position.into(),
            size,
        }
    }
}

impl embedded_io_async::Error for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Interrupted => ErrorKind::Interrupted,
            Self::OutOfRange { .. } => ErrorKind::InvalidInput,
            Self::AllocationExhausted { .. } => ErrorKind::OutOfMemory,
            Self::InvalidConfig(_) | Self::Config(_) => ErrorKind::InvalidData,
            Self::AlreadyRegistered(_) => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NoDevice => ErrorKind::NotConnected,
            Self::Closed => ErrorKind::BrokenPipe,
        }
    }
}
