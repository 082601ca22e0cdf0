//! Push-to-pull stream bridge.
//!
//! The network side receives the request body as a sequence of chunks on
//! the async runtime. The envelope decoder wants a blocking [`Read`]. The
//! bridge joins the two with a bounded channel:
//!
//! ```text
//!  async runtime                         worker thread
//! ┌──────────────┐  send().await   ┌───────────────┐  read()
//! │ BridgeWriter │ ──────────────▶ │ bounded queue │ ◀──────── BridgeReader
//! └──────────────┘  (suspends when └───────────────┘  (blocks until a chunk
//!                    the queue is full)                 or end-of-stream)
//! ```
//!
//! Chunks come out in the order they went in. A writer that goes away
//! without calling [`BridgeWriter::finish`] is treated as a broken
//! transport, so the reader can tell a complete body from a cut one.

use std::io::{self, Read};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, Bytes};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::sync::mpsc;

use crate::error::BoxError;

/// Default number of chunks buffered between writer and reader.
pub const DEFAULT_BRIDGE_CAPACITY: usize = 16;

/// The reader half was dropped; nothing will consume further chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("bridge reader is gone")]
pub struct ReaderGone;

#[derive(Debug, Default)]
struct Shared {
    finished: AtomicBool,
}

/// Create a bridge buffering up to `capacity` chunks.
///
/// A `capacity` of zero is raised to one.
pub fn channel(capacity: usize) -> (BridgeWriter, BridgeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared::default());
    (
        BridgeWriter {
            tx,
            shared: shared.clone(),
        },
        BridgeReader {
            rx,
            current: Bytes::new(),
            shared,
            state: ReadState::Open,
        },
    )
}

/// Producer half. Lives on the async runtime.
#[derive(Debug)]
pub struct BridgeWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    shared: Arc<Shared>,
}

impl BridgeWriter {
    /// Queue a chunk, waiting for room if the buffer is full.
    pub async fn send(&self, chunk: Bytes) -> Result<(), ReaderGone> {
        self.tx.send(Ok(chunk)).await.map_err(|_| ReaderGone)
    }

    /// Signal a clean end-of-stream.
    pub fn finish(self) {
        self.shared.finished.store(true, Ordering::Release);
    }

    /// Hand a transport failure to the reader and close the stream.
    pub async fn abort(self, err: io::Error) {
        // Reader may already be gone; then there is nobody to tell.
        let _ = self.tx.send(Err(err)).await;
    }

    /// Whether the reader has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Open,
    Eof,
    Broken,
}

/// Consumer half. Blocking; use from a worker thread, never from async code.
#[derive(Debug)]
pub struct BridgeReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
    shared: Arc<Shared>,
    state: ReadState,
}

impl BridgeReader {
    fn next_chunk(&mut self) -> io::Result<bool> {
        match self.rx.blocking_recv() {
            Some(Ok(chunk)) => {
                self.current = chunk;
                Ok(true)
            }
            Some(Err(err)) => {
                self.state = ReadState::Broken;
                self.rx.close();
                Err(err)
            }
            None if self.shared.finished.load(Ordering::Acquire) => {
                self.state = ReadState::Eof;
                Ok(false)
            }
            None => {
                self.state = ReadState::Broken;
                Err(stream_closed())
            }
        }
    }
}

fn stream_closed() -> io::Error {
    io::Error::new(
        io::ErrorKind::ConnectionAborted,
        "request stream closed before end of stream",
    )
}

impl Read for BridgeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.has_remaining() {
                let n = buf.len().min(self.current.remaining());
                self.current.copy_to_slice(&mut buf[..n]);
                return Ok(n);
            }
            match self.state {
                ReadState::Eof => return Ok(0),
                ReadState::Broken => return Err(stream_closed()),
                ReadState::Open => {
                    if !self.next_chunk()? {
                        return Ok(0);
                    }
                }
            }
        }
    }
}

/// Drive an HTTP body into a bridge writer.
///
/// Data frames are forwarded in order; trailers and empty frames are
/// skipped. Stops early if the reader goes away. A body error is forwarded
/// to the reader as an [`io::Error`].
pub async fn pipe_body<B>(body: B, writer: BridgeWriter)
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError> + Send,
{
    let mut body = pin!(body);
    loop {
        let Some(frame) = body.frame().await else {
            break;
        };
        let frame = frame.map_err(Into::<BoxError>::into);
        match frame {
            Ok(frame) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                if data.is_empty() {
                    continue;
                }
                if writer.send(data).await.is_err() {
                    tracing::trace!(
                        target: "anyrpc_axum",
                        "reader dropped, discarding rest of request body"
                    );
                    return;
                }
            }
            Err(err) => {
                let err = io::Error::other(err);
                tracing::debug!(target: "anyrpc_axum", error = %err, "request body failed");
                writer.abort(err).await;
                return;
            }
        }
    }
    writer.finish();
}
