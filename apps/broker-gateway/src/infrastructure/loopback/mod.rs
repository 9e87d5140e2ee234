//! Loopback Transport
//!
//! In-process [`Transport`] for replaying captured broker sessions and for
//! driving adapters in tests. Each queued connection hands out a
//! [`LoopbackHandle`] that injects inbound frames and records outbound
//! ones.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::{FrameSink, FrameSource, Transport, TransportError};

type Inbound = Result<String, TransportError>;

enum PendingOpen {
    Connection {
        inbound: mpsc::UnboundedReceiver<Inbound>,
        wire: Arc<Wire>,
    },
    Fail(TransportError),
    Stall,
}

#[derive(Debug, Default)]
struct Wire {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

// =============================================================================
// Transport
// =============================================================================

/// Queue-driven in-process transport.
pub struct LoopbackTransport {
    endpoint: String,
    pending: Mutex<VecDeque<PendingOpen>>,
    opens: AtomicUsize,
}

impl LoopbackTransport {
    /// Create a transport with nothing queued.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            pending: Mutex::new(VecDeque::new()),
            opens: AtomicUsize::new(0),
        }
    }

    /// Queue a connection for the next `open` and return its handle.
    #[must_use]
    pub fn expect_connection(&self) -> LoopbackHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let wire = Arc::new(Wire::default());
        self.pending.lock().push_back(PendingOpen::Connection {
            inbound: rx,
            wire: Arc::clone(&wire),
        });
        LoopbackHandle { inbound: tx, wire }
    }

    /// Make the next `open` fail.
    pub fn fail_next_open(&self, error: TransportError) {
        self.pending.lock().push_back(PendingOpen::Fail(error));
    }

    /// Make the next `open` never complete.
    pub fn stall_next_open(&self) {
        self.pending.lock().push_back(PendingOpen::Stall);
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.pending.lock().pop_front();

        match next {
            Some(PendingOpen::Connection { inbound, wire }) => Ok((
                Box::new(LoopbackSink { wire }),
                Box::new(LoopbackSource { inbound }),
            )),
            Some(PendingOpen::Fail(error)) => Err(error),
            Some(PendingOpen::Stall) => std::future::pending().await,
            None => Err(TransportError::ConnectFailed(
                "no loopback connection queued".to_string(),
            )),
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Test-side end of one loopback connection. Dropping it ends the inbound
/// stream, which the adapter sees as the peer closing.
#[derive(Debug)]
pub struct LoopbackHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    wire: Arc<Wire>,
}

impl LoopbackHandle {
    /// Deliver an inbound frame. Returns false once the reader is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.inbound.send(Ok(frame.into())).is_ok()
    }

    /// Deliver an inbound read error.
    pub fn push_error(&self, error: TransportError) -> bool {
        self.inbound.send(Err(error)).is_ok()
    }

    /// Frames the adapter has sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.wire.sent.lock().clone()
    }

    /// Whether the adapter closed its end.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.wire.closed.load(Ordering::SeqCst)
    }

    /// Make every following send fail.
    pub fn fail_sends(&self) {
        self.wire.fail_sends.store(true, Ordering::SeqCst);
    }

    /// End the inbound stream.
    pub fn hang_up(self) {
        drop(self);
    }
}

// =============================================================================
// Halves
// =============================================================================

struct LoopbackSink {
    wire: Arc<Wire>,
}

#[async_trait]
impl FrameSink for LoopbackSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.wire.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.wire.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("loopback send failure".to_string()));
        }
        self.wire.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.wire.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct LoopbackSource {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameSource for LoopbackSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_without_queue_fails() {
        let transport = LoopbackTransport::new("loopback://test");
        let result = transport.open().await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn queued_connection_carries_frames_both_ways() {
        let transport = LoopbackTransport::new("loopback://test");
        let handle = transport.expect_connection();

        let (mut sink, mut source) = transport.open().await.unwrap();
        sink.send("hello".to_string()).await.unwrap();
        assert_eq!(handle.sent(), vec!["hello".to_string()]);

        assert!(handle.push("world"));
        assert_eq!(source.next_frame().await, Some(Ok("world".to_string())));

        handle.hang_up();
        assert_eq!(source.next_frame().await, None);
    }

    #[tokio::test]
    async fn failures_are_served_in_order() {
        let transport = LoopbackTransport::new("loopback://test");
        transport.fail_next_open(TransportError::ConnectFailed("refused".to_string()));
        let _handle = transport.expect_connection();

        assert!(transport.open().await.is_err());
        assert!(transport.open().await.is_ok());
    }

    #[tokio::test]
    async fn closed_sink_rejects_sends() {
        let transport = LoopbackTransport::new("loopback://test");
        let handle = transport.expect_connection();
        let (mut sink, _source) = transport.open().await.unwrap();

        sink.close().await.unwrap();
        assert!(handle.is_closed());
        assert_eq!(sink.send("x".to_string()).await, Err(TransportError::Closed));
    }
}
