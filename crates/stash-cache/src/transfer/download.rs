//! Coalesced downloads.
//!
//! One pump task per key reads the backend and fans chunks out to every
//! subscribed caller over bounded channels, so the slowest subscriber paces
//! the read. A caller arriving after the pump started streaming cannot see
//! the bytes already sent; it waits for that pump to finish and starts a
//! fresh one.
//!
//! A pump whose subscribers have all gone stops, even while the backend read
//! is still opening. Every pump holds the engine's task lock until it exits,
//! which is what [`TransferEngine::drain`] waits on.

use bytes::{Bytes, BytesMut};
use dashmap::mapref::entry::Entry;
use futures::future;
use parking_lot::Mutex;
use stash_core::{StashError, StashResult};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, OwnedRwLockReadGuard};
use tracing::debug;

use super::{PendingGuard, TransferEngine, TransferId};
use crate::backend::{Backend, StoreKey};

/// Chunks buffered per subscriber before the pump waits
const QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone)]
enum Frame {
    Chunk(Bytes),
    End,
    Missing,
    Failed(StashError),
}

/// `None` once the pump has started streaming
type Subscribers = Arc<Mutex<Option<Vec<mpsc::Sender<Frame>>>>>;

/// Table entry for an in-flight download
#[derive(Debug)]
pub(crate) struct PendingDownload {
    id: u64,
    subscribers: Subscribers,
    /// Closed when the pump exits
    finished: watch::Receiver<()>,
}

impl TransferId for PendingDownload {
    fn id(&self) -> u64 {
        self.id
    }
}

enum Attach {
    Joined(mpsc::Receiver<Frame>),
    Started(mpsc::Receiver<Frame>, Pump),
    Sealed(watch::Receiver<()>),
}

impl TransferEngine {
    /// Stream the record under `key` into `sink`.
    ///
    /// Returns `Ok(false)` without touching the sink when the record is
    /// absent. If an upload of the same key is in flight, its outcome is
    /// awaited first and its failure is returned as is. On any other failure
    /// the sink keeps whatever was already written to it.
    pub(crate) async fn download<W>(&self, key: &StoreKey, sink: &mut W) -> StashResult<bool>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        if let Some(upload) = self.pending_upload(key) {
            debug!(key = %key, "waiting for in-flight upload before reading");
            self.stats.upload_awaited();
            upload.await?;
        }

        let mut frames = self.subscribe(key).await?;
        loop {
            match frames.recv().await {
                Some(Frame::Chunk(bytes)) => {
                    sink.write_all(&bytes)
                        .await
                        .map_err(|e| StashError::io(format!("Failed to write {} to sink", key), e))?;
                }
                Some(Frame::End) => {
                    sink.flush()
                        .await
                        .map_err(|e| StashError::io(format!("Failed to flush sink for {}", key), e))?;
                    return Ok(true);
                }
                Some(Frame::Missing) => {
                    self.stats.miss();
                    return Ok(false);
                }
                Some(Frame::Failed(error)) => return Err(error),
                None => {
                    return Err(StashError::interrupted(format!(
                        "Download of {} stopped before completing",
                        key
                    )))
                }
            }
        }
    }

    async fn subscribe(&self, key: &StoreKey) -> StashResult<mpsc::Receiver<Frame>> {
        loop {
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

            let attach = match self.downloads.entry(key.clone()) {
                Entry::Occupied(entry) => {
                    let pending = entry.get();
                    let mut subscribers = pending.subscribers.lock();
                    let attach = match subscribers.as_mut() {
                        Some(list) => {
                            list.push(tx);
                            Attach::Joined(rx)
                        }
                        None => Attach::Sealed(pending.finished.clone()),
                    };
                    attach
                }
                Entry::Vacant(entry) => {
                    // Only fails once `drain` has started, after the last
                    // operation left
                    let Ok(running) = Arc::clone(&self.tasks).try_read_owned() else {
                        return Err(StashError::Closed);
                    };
                    let id = self.next_id();
                    let subscribers: Subscribers = Arc::new(Mutex::new(Some(vec![tx])));
                    let (finished_tx, finished_rx) = watch::channel(());
                    entry.insert(PendingDownload {
                        id,
                        subscribers: Arc::clone(&subscribers),
                        finished: finished_rx,
                    });
                    let pump = Pump {
                        backend: Arc::clone(&self.backend),
                        key: key.clone(),
                        subscribers,
                        chunk_size: self.chunk_size,
                        _guard: Self::guard(&self.downloads, key, id),
                        _finished: finished_tx,
                        _running: running,
                    };
                    Attach::Started(rx, pump)
                }
            };

            match attach {
                Attach::Joined(rx) => {
                    debug!(key = %key, "joining in-flight download");
                    self.stats.download_coalesced();
                    return Ok(rx);
                }
                Attach::Started(rx, pump) => {
                    self.stats.download_started();
                    tokio::spawn(pump.run());
                    return Ok(rx);
                }
                Attach::Sealed(mut finished) => {
                    debug!(key = %key, "download already streaming, waiting for it to finish");
                    // Only ever resolves with an error, once the pump is gone
                    let _ = finished.changed().await;
                }
            }
        }
    }
}

/// Single backend read feeding every subscriber of a key.
///
/// Field order matters on drop: the table entry goes before late callers
/// are woken, and the task lock is released last.
struct Pump {
    backend: Arc<dyn Backend>,
    key: StoreKey,
    subscribers: Subscribers,
    chunk_size: usize,
    _guard: PendingGuard<PendingDownload>,
    _finished: watch::Sender<()>,
    _running: OwnedRwLockReadGuard<()>,
}

impl Pump {
    async fn run(self) {
        let opened = tokio::select! {
            opened = self.backend.read(&self.key) => opened,
            () = abandoned(&self.subscribers) => {
                debug!(key = %self.key, "every subscriber left before the read opened");
                return;
            }
        };
        let Some(mut subscribers) = self.subscribers.lock().take() else {
            return;
        };
        debug!(key = %self.key, subscribers = subscribers.len(), "download streaming");

        let mut stream = match opened {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                broadcast(&mut subscribers, Frame::Missing).await;
                return;
            }
            Err(error) => {
                broadcast(&mut subscribers, Frame::Failed(error)).await;
                return;
            }
        };

        loop {
            let mut buf = BytesMut::with_capacity(self.chunk_size);
            match stream.read_buf(&mut buf).await {
                Ok(0) => {
                    broadcast(&mut subscribers, Frame::End).await;
                    return;
                }
                Ok(_) => {
                    if !broadcast(&mut subscribers, Frame::Chunk(buf.freeze())).await {
                        debug!(key = %self.key, "every subscriber left, abandoning download");
                        return;
                    }
                }
                Err(e) => {
                    let error = StashError::backend(format!("Failed to read {}", self.key), e);
                    broadcast(&mut subscribers, Frame::Failed(error)).await;
                    return;
                }
            }
        }
    }
}

/// Resolves once every subscriber has gone, sealing the list so that no one
/// joins afterwards. Never resolves after the pump sealed it.
async fn abandoned(subscribers: &Subscribers) {
    loop {
        let live = {
            let mut slot = subscribers.lock();
            match slot.as_ref().map(|list| list.iter().all(mpsc::Sender::is_closed)) {
                Some(true) => {
                    *slot = None;
                    return;
                }
                Some(false) => slot.as_ref().cloned(),
                None => None,
            }
        };
        let Some(live) = live else {
            return future::pending().await;
        };
        // Subscribers may join meanwhile, so look again afterwards
        future::join_all(live.iter().map(|tx| tx.closed())).await;
    }
}

/// Send `frame` to every live subscriber, dropping the ones that left.
/// Returns whether anyone is still listening.
async fn broadcast(subscribers: &mut Vec<mpsc::Sender<Frame>>, frame: Frame) -> bool {
    let mut live = Vec::with_capacity(subscribers.len());
    for tx in subscribers.drain(..) {
        if tx.send(frame.clone()).await.is_ok() {
            live.push(tx);
        }
    }
    *subscribers = live;
    !subscribers.is_empty()
}
