//! memdev demo
//!
//! Appends stdin lines to a device, then reads them back through two
//! sessions at once. Set `MEMDEV_CONFIG` to a JSON store configuration
//! (e.g. `{"page_size": 16, "initial_order": 0, "max_capacity": 64}`) and
//! `RUST_LOG=debug` to watch the store grow and fill up.

use std::io::{self, BufRead};
use std::sync::Arc;

use memdev::{Device, Interrupt, OpenMode, Registry, Session, StoreConfig, StoreError};
use tracing::info;

const DEVICE_NAME: &str = "memdev0";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = StoreConfig::from_env()?;
    let registry = Arc::new(Registry::new());
    let device = Device::init(&registry, DEVICE_NAME, &config)?;

    let mut writer = device.open(OpenMode::Append);
    println!("Enter text (empty line to quit):");
    for line in io::stdin().lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }

        let data = format!("{trimmed}\n");
        let written = writer.write(data.as_bytes()).await?;
        if written < data.len() {
            println!("Store is full, kept {written} of {} bytes", data.len());
            break;
        }
    }
    writer.close();

    let readers = ["r1", "r2"].map(|name| {
        let session = registry.open(DEVICE_NAME, OpenMode::ReadWrite);
        async move { read_all(name, session?).await }
    });
    for result in futures::future::join_all(readers).await {
        result?;
    }

    let stats = device.stat(&Interrupt::new()).await?;
    info!(
        size = stats.size,
        capacity = stats.capacity,
        order = stats.order,
        "final store state"
    );
    device.teardown();
    Ok(())
}

async fn read_all(name: &str, mut session: Session) -> Result<(), StoreError> {
    let mut buf = [0u8; 8];
    loop {
        match session.read(&mut buf).await {
            Ok(n) => println!("{name}: {:?}", String::from_utf8_lossy(&buf[..n])),
            // Reading at the end of the data is an error, not an empty read
            Err(StoreError::OutOfRange { .. }) => break,
            Err(e) => return Err(e),
        }
    }
    println!("{name}: done");
    Ok(())
}
