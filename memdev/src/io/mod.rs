//! Storage for memdev
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Session (per-caller cursor)        │
//! │  - read / write / seek              │
//! └─────────────────────────────────────┘
//!          │ acquires
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  AccessGate<ByteStore>              │
//! │  - one holder at a time, FIFO       │
//! │  - waiting is interruptible         │
//! └─────────────────────────────────────┘
//!          │ guards
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  ByteStore (this module)            │
//! │  - zero-filled region, doubles      │
//! │  - bounds-checked read_at/write_at  │
//! └─────────────────────────────────────┘
//! ```

pub mod store;
pub mod types;

pub use store::{grown, ByteStore};
pub use types::{OpenMode, SeekFrom, StoreStats};
