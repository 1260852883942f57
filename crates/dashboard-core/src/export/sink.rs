use super::ExportError;
use bytes::{Bytes, BytesMut};
use core::future::{Future, ready};
use tokio::sync::mpsc;

/// Destination for the encoded document.
///
/// The exporter checks [`is_closed`](ByteSink::is_closed) before every batch
/// and every chunk, and stops with [`ExportError::SinkClosed`] once the
/// consumer is gone. It ends a successful export with
/// [`close`](ByteSink::close) and a failed one with
/// [`abort`](ByteSink::abort), never both.
pub trait ByteSink: Send + Sync {
    fn is_closed(&self) -> bool;

    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), ExportError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Tells the consumer the document is incomplete.
    fn abort(&mut self, error: &ExportError) -> impl Future<Output = ()> + Send;
}

/// Collects the document in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: BytesMut,
    closed: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes written so far. Empty after an abort.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl ByteSink for BufferSink {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), ExportError>> + Send {
        let result = if self.closed {
            Err(ExportError::SinkClosed)
        } else {
            self.buf.extend_from_slice(&chunk);
            Ok(())
        };
        ready(result)
    }

    fn close(&mut self) -> impl Future<Output = Result<(), ExportError>> + Send {
        self.closed = true;
        ready(Ok(()))
    }

    fn abort(&mut self, _error: &ExportError) -> impl Future<Output = ()> + Send {
        self.buf.clear();
        self.closed = true;
        ready(())
    }
}

pub type SinkItem = Result<Bytes, std::io::Error>;

/// Forwards chunks to a bounded channel, typically drained into an HTTP
/// response body.
///
/// Closing drops the sender, which ends the receiving stream. Aborting
/// sends one error item first so the consumer can tell a truncated document
/// from a complete one.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::Sender<SinkItem>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SinkItem>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SinkItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl ByteSink for ChannelSink {
    fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(mpsc::Sender::is_closed)
    }

    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), ExportError>> + Send {
        let tx = self.tx.clone();
        async move {
            let tx = tx.ok_or(ExportError::SinkClosed)?;
            tx.send(Ok(chunk))
                .await
                .map_err(|_| ExportError::SinkClosed)
        }
    }

    fn close(&mut self) -> impl Future<Output = Result<(), ExportError>> + Send {
        self.tx = None;
        ready(Ok(()))
    }

    fn abort(&mut self, error: &ExportError) -> impl Future<Output = ()> + Send {
        let tx = self.tx.take();
        let message = error.to_string();
        async move {
            if let Some(tx) = tx {
                let _ = tx.send(Err(std::io::Error::other(message))).await;
            }
        }
    }
}
