//! Test doubles: a backend whose reads and writes can be held back or made
//! to fail, and a reader that errors after a prefix.

use async_trait::async_trait;
use parking_lot::Mutex;
use stash_core::{StashError, StashResult};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::Semaphore;

use super::{Backend, ByteStream, MemoryBackend, StoreKey};

const OPEN: usize = 1 << 20;

/// Reader yielding `prefix` and then an I/O error
pub(crate) struct FailingReader {
    prefix: Cursor<Vec<u8>>,
}

impl FailingReader {
    pub(crate) fn after(prefix: Vec<u8>) -> Self {
        Self {
            prefix: Cursor::new(prefix),
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.prefix).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() == before => Poll::Ready(Err(
                io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"),
            )),
            other => other,
        }
    }
}

/// Memory backend with gates and fault injection
#[derive(Debug)]
pub(crate) struct ControlledBackend {
    pub(crate) inner: MemoryBackend,
    write_gate: Semaphore,
    read_gate: Semaphore,
    fail_writes: AtomicBool,
    fail_next_close: AtomicBool,
    truncate_reads_at: Mutex<Option<usize>>,
    writes_started: AtomicUsize,
    reads_started: AtomicUsize,
}

impl ControlledBackend {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            write_gate: Semaphore::new(OPEN),
            read_gate: Semaphore::new(OPEN),
            fail_writes: AtomicBool::new(false),
            fail_next_close: AtomicBool::new(false),
            truncate_reads_at: Mutex::new(None),
            writes_started: AtomicUsize::new(0),
            reads_started: AtomicUsize::new(0),
        }
    }

    /// Writes block until `release_writes`
    pub(crate) fn with_paused_writes(mut self) -> Self {
        self.write_gate = Semaphore::new(0);
        self
    }

    /// Reads block until `release_reads`
    pub(crate) fn with_paused_reads(mut self) -> Self {
        self.read_gate = Semaphore::new(0);
        self
    }

    pub(crate) fn release_writes(&self) {
        self.write_gate.add_permits(OPEN);
    }

    pub(crate) fn release_reads(&self) {
        self.read_gate.add_permits(OPEN);
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// The next `close` fails without closing anything
    pub(crate) fn fail_next_close(&self) {
        self.fail_next_close.store(true, Ordering::SeqCst);
    }

    /// Reads yield `len` bytes and then fail
    pub(crate) fn truncate_reads_at(&self, len: usize) {
        *self.truncate_reads_at.lock() = Some(len);
    }

    pub(crate) fn writes_started(&self) -> usize {
        self.writes_started.load(Ordering::SeqCst)
    }

    pub(crate) fn reads_started(&self) -> usize {
        self.reads_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ControlledBackend {
    fn name(&self) -> &'static str {
        "controlled"
    }

    async fn exists(&self, key: &StoreKey) -> StashResult<bool> {
        self.inner.exists(key).await
    }

    async fn read(&self, key: &StoreKey) -> StashResult<Option<ByteStream>> {
        self.reads_started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .read_gate
            .acquire()
            .await
            .map_err(|_| StashError::backend_msg("read gate closed"))?;

        let Some(mut stream) = self.inner.read(key).await? else {
            return Ok(None);
        };
        let truncate = *self.truncate_reads_at.lock();
        match truncate {
            Some(len) => {
                let mut data = Vec::new();
                stream
                    .read_to_end(&mut data)
                    .await
                    .map_err(|e| StashError::backend("read failed", e))?;
                data.truncate(len);
                Ok(Some(Box::pin(FailingReader::after(data))))
            }
            None => Ok(Some(stream)),
        }
    }

    async fn write(&self, key: &StoreKey, data: ByteStream) -> StashResult<()> {
        self.writes_started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .write_gate
            .acquire()
            .await
            .map_err(|_| StashError::backend_msg("write gate closed"))?;

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StashError::backend(
                format!("Failed to write {}", key),
                io::Error::new(io::ErrorKind::BrokenPipe, "backend unreachable"),
            ));
        }
        self.inner.write(key, data).await
    }

    async fn close(&self) -> StashResult<()> {
        if self.fail_next_close.swap(false, Ordering::SeqCst) {
            return Err(StashError::backend_msg("close refused"));
        }
        self.inner.close().await
    }
}

/// Poll `condition` until it holds, failing the test after a few seconds
pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
