//! Application Ports (Driver and Driven)
//!
//! Ports define the seams a broker plugin plugs into and the external
//! systems the framework drives.
//!
//! ## Plugin Ports (every broker provides)
//!
//! - `Authenticator`: credentials → broker session
//! - `AdapterFactory`: session + transport → streaming adapter
//! - `MessageNormalizer` / `SubscriptionEncoder`: native ↔ canonical frames
//! - `MarginCalculator`: optional margin API translation
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: bidirectional text-framed connection
//! - `DescriptorSource`: plugin metadata lookup

mod adapter_factory_port;
mod auth_port;
mod descriptor_port;
mod margin_port;
mod normalizer_port;
mod transport_port;

pub use adapter_factory_port::AdapterFactory;
pub use auth_port::{AuthError, Authenticator, BrokerSession, CredentialField, Credentials};
#[cfg(test)]
pub use descriptor_port::MockDescriptorSource;
pub use descriptor_port::{DescriptorSource, StaticDescriptorSource};
pub use margin_port::{MarginCalculator, MarginError};
pub use normalizer_port::{MessageNormalizer, NativeSubscription, ParseError, SubscriptionEncoder};
pub use transport_port::{FrameSink, FrameSource, Transport, TransportError};
