//! Adapter Factory Port
//!
//! The second entry point every broker plugin must provide: given an
//! authenticated session and a transport, build the broker's streaming
//! adapter.

use std::sync::Arc;

use crate::application::ports::{BrokerSession, Transport};
use crate::application::services::adapter::{AdapterSettings, StreamingAdapter};
use crate::domain::capability::CapabilityRegistry;

/// Builds streaming adapters for one broker.
pub trait AdapterFactory: Send + Sync {
    /// Streaming endpoint for an authenticated session.
    fn stream_url(&self, session: &BrokerSession) -> String;

    /// Capabilities of the adapters this factory builds.
    fn capabilities(&self) -> &CapabilityRegistry;

    /// Create a disconnected adapter bound to the session and transport.
    fn create(
        &self,
        session: BrokerSession,
        transport: Arc<dyn Transport>,
        settings: AdapterSettings,
    ) -> Arc<StreamingAdapter>;
}
