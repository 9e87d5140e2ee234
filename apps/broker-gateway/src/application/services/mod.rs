//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamingAdapter`: per-broker connection state machine and event stream
//! - `PluginCatalog`: compiled-in broker plugins
//! - `PluginLoader`: activation and resolution into a `BrokerRegistry`
//! - `AdapterDirectory`: live adapters for diagnostics

pub mod adapter;
pub mod catalog;
pub mod directory;
pub mod loader;
pub mod registry;

pub use adapter::{
    AdapterError, AdapterSettings, AdapterSnapshot, BrokerProfile, StandardAdapterFactory,
    StreamingAdapter,
};
pub use catalog::{PluginCatalog, PluginRegistration, PluginResolutionError, ResolvedPlugin};
pub use directory::AdapterDirectory;
pub use loader::{LoadOutcome, PluginLoader};
pub use registry::{BrokerRegistry, BrokerRegistryEntry, RegistryError, SharedRegistry};
