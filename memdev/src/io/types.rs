//! Session-facing I/O types

pub use embedded_io_async::SeekFrom;

/// Mode for opening a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read and write at the session cursor
    #[default]
    ReadWrite,
    /// Like `ReadWrite`, but every write first moves the cursor to the end of the data
    Append,
}

/// Snapshot of the store counters, taken under the access gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub size: usize,
    pub capacity: usize,
    pub order: u8,
    pub open_sessions: usize,
}
