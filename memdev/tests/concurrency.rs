use std::sync::Arc;
use std::time::Duration;

use memdev::{Device, Interrupt, OpenMode, Registry, SeekFrom, StoreConfig, StoreError};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}

fn device(max_capacity: Option<usize>) -> Arc<Device> {
    let registry = Arc::new(Registry::new());
    let config = StoreConfig {
        page_size: 16,
        initial_order: 0,
        max_capacity,
    };
    Arc::new(Device::init(&registry, "mem0", &config).unwrap())
}

async fn read_everything(device: &Device) -> Vec<u8> {
    let store = device.lock(&Interrupt::new()).await.unwrap();
    store.as_slice().to_vec()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_lose_no_update() {
    init_logging();
    const WRITERS: usize = 16;
    const ROUNDS: usize = 20;
    const CHUNK: usize = 7;

    let device = device(None);
    let tasks: Vec<_> = (0..WRITERS)
        .map(|i| {
            let mut session = device.open(OpenMode::Append);
            tokio::spawn(async move {
                let chunk = [b'a' + i as u8; CHUNK];
                let mut total = 0;
                for _ in 0..ROUNDS {
                    total += session.write(&chunk).await.unwrap();
                    tokio::task::yield_now().await;
                }
                total
            })
        })
        .collect();

    let mut written = 0;
    for result in futures::future::join_all(tasks).await {
        written += result.unwrap();
    }
    assert_eq!(written, WRITERS * ROUNDS * CHUNK);

    let data = read_everything(&device).await;
    assert_eq!(data.len(), written);
    // Each write landed as one contiguous chunk
    for chunk in data.chunks(CHUNK) {
        assert!(chunk.iter().all(|&b| b == chunk[0]), "interleaved: {chunk:?}");
    }
    for i in 0..WRITERS {
        let count = data.iter().filter(|&&b| b == b'a' + i as u8).count();
        assert_eq!(count, ROUNDS * CHUNK);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_size_only_grows_under_concurrent_writers() {
    init_logging();
    let device = device(None);

    let writers: Vec<_> = (0..8)
        .map(|_| {
            let mut session = device.open(OpenMode::Append);
            tokio::spawn(async move {
                for _ in 0..50 {
                    session.write(b"0123").await.unwrap();
                }
            })
        })
        .collect();

    let observer = {
        let device = Arc::clone(&device);
        tokio::spawn(async move {
            let interrupt = Interrupt::new();
            let mut last = 0;
            for _ in 0..200 {
                let stats = device.stat(&interrupt).await.unwrap();
                assert!(stats.size >= last);
                assert!(stats.size <= stats.capacity);
                last = stats.size;
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    observer.await.unwrap();
    assert_eq!(device.stat(&Interrupt::new()).await.unwrap().size, 8 * 50 * 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocked_write_completes_after_release() {
    init_logging();
    let device = device(None);

    // Hold the gate so that both sessions queue up behind it
    let guard = device.lock(&Interrupt::new()).await.unwrap();

    let mut b = device.open(OpenMode::Append);
    let first = tokio::spawn(async move {
        let n = b.write(b"BBBBBB").await.unwrap();
        (b, n)
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut a = device.open(OpenMode::Append);
    let second = tokio::spawn(async move {
        let n = a.write(b"AAAA").await.unwrap();
        (a, n)
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!first.is_finished());
    assert!(!second.is_finished());
    assert!(guard.as_slice().is_empty());
    drop(guard);

    let (b, n) = first.await.unwrap();
    assert_eq!(n, 6);
    assert_eq!(b.tell(), 6);

    // A's append starts where B's completed write ended
    let (a, n) = second.await.unwrap();
    assert_eq!(n, 4);
    assert_eq!(a.tell(), 10);
    assert_eq!(read_everything(&device).await, b"BBBBBBAAAA");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_raise_on_free_gate_does_not_abort_later_wait() {
    init_logging();
    let device = device(None);

    let mut session = device.open(OpenMode::Append);
    session.interrupt().raise();
    assert_eq!(session.write(b"abc").await.unwrap(), 3);
    assert!(!session.interrupt().is_raised());

    let guard = device.lock(&Interrupt::new()).await.unwrap();
    let task = tokio::spawn(async move {
        let result = session.write(b"d").await;
        (session, result)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    drop(guard);

    let (session, result) = task.await.unwrap();
    assert_eq!(result.unwrap(), 1);
    assert_eq!(session.tell(), 4);
    assert_eq!(read_everything(&device).await, b"abcd");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interrupted_wait_changes_nothing() {
    init_logging();
    let device = device(None);

    let mut session = device.open(OpenMode::ReadWrite);
    session.write(b"abc").await.unwrap();
    session.seek(SeekFrom::Start(1)).await.unwrap();

    let guard = device.lock(&Interrupt::new()).await.unwrap();
    let interrupt = session.interrupt();
    let task = tokio::spawn(async move {
        let result = session.write(b"XYZ").await;
        (session, result)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    interrupt.raise();

    let (mut session, result) = task.await.unwrap();
    assert!(matches!(result, Err(StoreError::Interrupted)));
    assert_eq!(session.tell(), 1);
    drop(guard);

    assert_eq!(read_everything(&device).await, b"abc");

    // The interrupt was consumed: re-issuing the call goes through
    assert_eq!(session.write(b"XYZ").await.unwrap(), 3);
    assert_eq!(read_everything(&device).await, b"aXYZ");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waiters_are_served_in_arrival_order() {
    init_logging();
    let device = device(None);
    let guard = device.lock(&Interrupt::new()).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..5u8 {
        let mut session = device.open(OpenMode::Append);
        tasks.push(tokio::spawn(async move {
            session.write(&[b'0' + i]).await.unwrap();
        }));
        // Let this waiter queue up before the next one starts
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    drop(guard);
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(read_everything(&device).await, b"01234");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_hit_the_limit_together() {
    init_logging();
    let device = device(Some(64));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let mut session = device.open(OpenMode::Append);
            tokio::spawn(async move {
                let mut total = 0;
                for _ in 0..10 {
                    total += session.write(&[1u8; 5]).await.unwrap();
                }
                total
            })
        })
        .collect();

    let mut written = 0;
    for task in tasks {
        written += task.await.unwrap();
    }
    assert_eq!(written, 64);

    let stats = device.stat(&Interrupt::new()).await.unwrap();
    assert_eq!(stats.size, 64);
    assert_eq!(stats.capacity, 64);
}
