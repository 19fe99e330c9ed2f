//! In-memory byte device with file-like sessions
//!
//! A [`Device`] owns a zero-filled byte store that doubles its capacity as
//! data is written. Callers open [`Session`]s, each with its own cursor,
//! and read, write and seek through them. All operations on one device are
//! serialized by its [`AccessGate`].
//!
//! ```
//! use std::sync::Arc;
//! use memdev::{Device, OpenMode, Registry, SeekFrom, StoreConfig};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let registry = Arc::new(Registry::new());
//! let device = Device::init(&registry, "mem0", &StoreConfig::default()).unwrap();
//!
//! let mut session = device.open(OpenMode::ReadWrite);
//! assert_eq!(session.write(b"hello").await.unwrap(), 5);
//! session.seek(SeekFrom::Start(0)).await.unwrap();
//!
//! let mut buf = [0u8; 16];
//! let n = session.read(&mut buf).await.unwrap();
//! assert_eq!(&buf[..n], b"hello");
//! # });
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod gate;
pub mod idgen;
pub mod io;
pub mod session;

pub use config::StoreConfig;
pub use device::{Device, Registry};
pub use error::StoreError;
pub use gate::{AccessGate, GateGuard, Interrupt};
pub use idgen::{DevNo, IdGen, SessionId};
pub use io::{ByteStore, OpenMode, SeekFrom, StoreStats};
pub use session::Session;
