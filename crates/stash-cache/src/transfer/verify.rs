//! Digest verification while streaming.

use parking_lot::Mutex;
use stash_core::{Digest, DigestFunction, DigestHasher, StashError};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Why a verified stream stopped early, readable after the consumer failed
#[derive(Debug, Clone, Default)]
pub(crate) struct Verdict(Arc<Mutex<Option<StashError>>>);

impl Verdict {
    fn record(&self, error: StashError) {
        self.0.lock().get_or_insert(error);
    }

    /// The recorded failure, if the stream produced one
    pub(crate) fn take(&self) -> Option<StashError> {
        self.0.lock().take()
    }
}

/// Reader that hashes what passes through and fails at end of stream when
/// the content does not match the expected digest.
///
/// The failure surfaces to the consumer as an `InvalidData` I/O error, so a
/// backend write aborts before the record becomes visible; the typed error
/// is kept in the [`Verdict`].
pub(crate) struct VerifyingReader<R> {
    inner: R,
    hasher: Option<DigestHasher>,
    expected: Digest,
    verdict: Verdict,
}

impl<R> VerifyingReader<R> {
    pub(crate) fn new(inner: R, function: DigestFunction, expected: Digest) -> (Self, Verdict) {
        let verdict = Verdict::default();
        let reader = Self {
            inner,
            hasher: Some(function.hasher()),
            expected,
            verdict: verdict.clone(),
        };
        (reader, verdict)
    }

    fn mismatch(&self, actual: String) -> io::Error {
        let error = StashError::DigestMismatch {
            expected: self.expected.to_string(),
            actual,
        };
        let message = error.to_string();
        self.verdict.record(error);
        io::Error::new(io::ErrorKind::InvalidData, message)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for VerifyingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Pin::new(&mut self.inner).poll_read(cx, buf);
        }

        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let this = &mut *self;
                let chunk = &buf.filled()[before..];
                let Some(hasher) = this.hasher.as_mut() else {
                    return Poll::Ready(Ok(()));
                };

                if !chunk.is_empty() {
                    hasher.update(chunk);
                    if hasher.size() > this.expected.size() {
                        this.hasher = None;
                        // An erroring read must not advance the buffer
                        buf.set_filled(before);
                        return Poll::Ready(Err(
                            this.mismatch(format!("more than {} bytes", this.expected.size())),
                        ));
                    }
                    return Poll::Ready(Ok(()));
                }

                // End of stream
                let Some(hasher) = this.hasher.take() else {
                    return Poll::Ready(Ok(()));
                };
                let actual = hasher.finalize();
                if actual != this.expected {
                    return Poll::Ready(Err(this.mismatch(actual.to_string())));
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                self.verdict.record(StashError::io(
                    "Failed to read upload source",
                    io::Error::new(e.kind(), e.to_string()),
                ));
                Poll::Ready(Err(e))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
