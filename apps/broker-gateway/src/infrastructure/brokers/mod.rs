//! Built-in Broker Plugins
//!
//! One module per broker. Each exposes `register`, which adds the broker's
//! authenticate entry point, adapter factory, and optional margin
//! calculator to a [`PluginCatalog`]. Whether a registered plugin becomes
//! active is decided at load time from its `plugin.json`.
//!
//! | Broker | Region | Feeds | Margin |
//! |--------|--------|-------|--------|
//! | `kotak` | IN | LTP, quote, depth, orders | yes |
//! | `dhan_sandbox` | IN | LTP, quote, depth | no |
//! | `wisdom` | IN | LTP | no |

pub mod common;
pub mod dhan_sandbox;
pub mod kotak;
pub mod wisdom;

use crate::application::services::PluginCatalog;

/// Catalog of every broker plugin compiled into this binary.
#[must_use]
pub fn builtin_catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    kotak::register(&mut catalog);
    dhan_sandbox::register(&mut catalog);
    wisdom::register(&mut catalog);
    catalog
}
