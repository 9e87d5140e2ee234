//! Transport Port (Driven Port)
//!
//! Interface for the bidirectional, text-framed connection a streaming
//! adapter talks to its broker over. Production uses WebSocket; tests and
//! replays use the in-process loopback.

use std::time::Duration;

use async_trait::async_trait;

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// An operation did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Configured limit.
        after: Duration,
    },

    /// Sending a frame failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Reading a frame failed.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    Closed,
}

/// Outbound half of an open connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the connection. Best effort.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of an open connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame. `None` once the connection has ended cleanly.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// Factory for broker connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection.
    async fn open(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;
}
