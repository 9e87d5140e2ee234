//! Exchange / Product / Order-Type / Feed Mapping
//!
//! Bidirectional translation between canonical codes and a broker's native
//! codes. A table is declared once from a list of primary pairs plus
//! optional aliases; the reverse direction is derived from the primary
//! pairs only.
//!
//! # Rules
//!
//! - Lookups are total. A code missing from the table passes through
//!   unchanged, so new exchange codes keep flowing without a release.
//! - Keys match case-insensitively (ASCII). Returned values are the stored
//!   spelling, never the caller's.
//! - Aliases only widen the forward direction (`NSE_INDEX` → `nse_cm`).
//!   When two primary pairs share a native code, the pair declared last
//!   owns the reverse direction.

use std::collections::HashMap;

use super::vocabulary::MappingCategory;

fn normalize_key(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

// =============================================================================
// Mapping Table
// =============================================================================

/// One bidirectional canonical ↔ native code table.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    primaries: Vec<String>,
}

impl MappingTable {
    /// Start declaring a table.
    #[must_use]
    pub fn builder() -> MappingTableBuilder {
        MappingTableBuilder::default()
    }

    /// Build a table from primary pairs only.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs
            .iter()
            .fold(Self::builder(), |builder, (canonical, native)| {
                builder.pair(canonical, native)
            })
            .build()
    }

    /// Translate a canonical code to the broker's native code.
    ///
    /// Unknown codes are returned unchanged.
    #[must_use]
    pub fn to_native<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.forward
            .get(&normalize_key(canonical))
            .map_or(canonical, String::as_str)
    }

    /// Translate a broker-native code to the canonical code.
    ///
    /// Unknown codes are returned unchanged.
    #[must_use]
    pub fn to_canonical<'a>(&'a self, native: &'a str) -> &'a str {
        self.reverse
            .get(&normalize_key(native))
            .map_or(native, String::as_str)
    }

    /// Whether the canonical code has an explicit forward mapping.
    #[must_use]
    pub fn contains_canonical(&self, canonical: &str) -> bool {
        self.forward.contains_key(&normalize_key(canonical))
    }

    /// Whether the native code has an explicit reverse mapping.
    #[must_use]
    pub fn contains_native(&self, native: &str) -> bool {
        self.reverse.contains_key(&normalize_key(native))
    }

    /// Canonical codes that own their native code in the reverse direction.
    ///
    /// For every code yielded here, `to_canonical(to_native(c)) == c`.
    pub fn canonical_codes(&self) -> impl Iterator<Item = &str> {
        self.primaries.iter().map(String::as_str).filter(|canonical| {
            self.forward
                .get(&normalize_key(canonical))
                .and_then(|native| self.reverse.get(&normalize_key(native)))
                .is_some_and(|owner| owner == canonical)
        })
    }

    /// Number of forward entries, aliases included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the table declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Declarative builder for [`MappingTable`].
#[derive(Debug, Default)]
pub struct MappingTableBuilder {
    table: MappingTable,
}

impl MappingTableBuilder {
    /// Declare a primary pair. It maps both directions.
    #[must_use]
    pub fn pair(mut self, canonical: &str, native: &str) -> Self {
        let canonical = canonical.trim();
        let native = native.trim();

        self.table
            .forward
            .insert(normalize_key(canonical), native.to_string());

        if let Some(previous) = self
            .table
            .reverse
            .insert(normalize_key(native), canonical.to_string())
            && previous != canonical
        {
            tracing::debug!(
                native,
                previous = %previous,
                canonical,
                "native code declared twice, last pair owns the reverse mapping"
            );
        }

        self.table.primaries.retain(|code| code != canonical);
        self.table.primaries.push(canonical.to_string());
        self
    }

    /// Declare a forward-only alias for an already-native code.
    #[must_use]
    pub fn alias(mut self, canonical: &str, native: &str) -> Self {
        self.table
            .forward
            .insert(normalize_key(canonical), native.trim().to_string());
        self
    }

    /// Finish the table.
    #[must_use]
    pub fn build(self) -> MappingTable {
        self.table
    }
}

// =============================================================================
// Broker Mappings
// =============================================================================

/// The full set of mapping tables a broker plugin declares.
#[derive(Debug, Clone, Default)]
pub struct BrokerMappings {
    /// Exchange / segment codes.
    pub exchange: MappingTable,
    /// Product types.
    pub product: MappingTable,
    /// Order types.
    pub order_type: MappingTable,
    /// Streaming feed codes.
    pub feed: MappingTable,
}

impl BrokerMappings {
    /// Get the table for a category.
    #[must_use]
    pub const fn table(&self, category: MappingCategory) -> &MappingTable {
        match category {
            MappingCategory::Exchange => &self.exchange,
            MappingCategory::Product => &self.product,
            MappingCategory::OrderType => &self.order_type,
            MappingCategory::FeedType => &self.feed,
        }
    }

    /// Translate a canonical code in the given category.
    #[must_use]
    pub fn to_native<'a>(&'a self, category: MappingCategory, canonical: &'a str) -> &'a str {
        self.table(category).to_native(canonical)
    }

    /// Translate a native code in the given category.
    #[must_use]
    pub fn to_canonical<'a>(&'a self, category: MappingCategory, native: &'a str) -> &'a str {
        self.table(category).to_canonical(native)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn exchanges() -> MappingTable {
        MappingTable::builder()
            .pair("NSE", "nse_cm")
            .pair("BSE", "bse_cm")
            .pair("NFO", "nse_fo")
            .pair("BCD", "bcs-fo")
            .alias("NSE_INDEX", "nse_cm")
            .alias("BSE_INDEX", "bse_cm")
            .build()
    }

    #[test]
    fn maps_known_codes_both_ways() {
        let table = exchanges();

        assert_eq!(table.to_native("NSE"), "nse_cm");
        assert_eq!(table.to_canonical("nse_cm"), "NSE");
        assert_eq!(table.to_native("BCD"), "bcs-fo");
        assert_eq!(table.to_canonical("bcs-fo"), "BCD");
    }

    #[test]
    fn unknown_codes_pass_through_unchanged() {
        let table = exchanges();

        assert_eq!(table.to_native("XYZ"), "XYZ");
        assert_eq!(table.to_canonical("unknown_seg"), "unknown_seg");
        assert_eq!(MappingTable::default().to_native("NSE"), "NSE");
    }

    #[test]
    fn lookups_ignore_case_and_return_stored_spelling() {
        let table = exchanges();

        assert_eq!(table.to_native("nse"), "nse_cm");
        assert_eq!(table.to_canonical("NSE_CM"), "NSE");
    }

    #[test]
    fn aliases_are_forward_only() {
        let table = exchanges();

        assert_eq!(table.to_native("NSE_INDEX"), "nse_cm");
        assert_eq!(table.to_canonical("nse_cm"), "NSE");
        assert!(!table.canonical_codes().any(|code| code == "NSE_INDEX"));
    }

    #[test]
    fn last_declared_pair_owns_shared_native_code() {
        let table = MappingTable::builder()
            .pair("NSE_INDEX", "IDX_I")
            .pair("BSE_INDEX", "IDX_I")
            .build();

        assert_eq!(table.to_native("NSE_INDEX"), "IDX_I");
        assert_eq!(table.to_native("BSE_INDEX"), "IDX_I");
        assert_eq!(table.to_canonical("IDX_I"), "BSE_INDEX");

        let owners: Vec<_> = table.canonical_codes().collect();
        assert_eq!(owners, vec!["BSE_INDEX"]);
    }

    #[test]
    fn redeclared_pair_keeps_single_primary_entry() {
        let table = MappingTable::builder()
            .pair("MIS", "mis")
            .pair("MIS", "MIS")
            .build();

        assert_eq!(table.to_native("MIS"), "MIS");
        assert_eq!(table.canonical_codes().count(), 1);
    }

    #[test]
    fn broker_mappings_dispatch_by_category() {
        let mappings = BrokerMappings {
            exchange: exchanges(),
            product: MappingTable::from_pairs(&[("NRML", "NRML"), ("BO", "Bracket Order")]),
            order_type: MappingTable::from_pairs(&[("LIMIT", "L")]),
            feed: MappingTable::default(),
        };

        assert_eq!(mappings.to_native(MappingCategory::Exchange, "NFO"), "nse_fo");
        assert_eq!(
            mappings.to_canonical(MappingCategory::Product, "Bracket Order"),
            "BO"
        );
        assert_eq!(mappings.to_native(MappingCategory::OrderType, "LIMIT"), "L");
        assert_eq!(mappings.to_native(MappingCategory::FeedType, "LTP"), "LTP");
    }

    proptest! {
        #[test]
        fn unmapped_codes_are_identity(code in "[A-Z]{3,6}_[0-9]{2}") {
            let table = exchanges();
            prop_assert_eq!(table.to_native(&code), code.as_str());
            prop_assert_eq!(table.to_canonical(&code), code.as_str());
        }

        #[test]
        fn primary_codes_round_trip(index in 0usize..4) {
            let table = exchanges();
            let codes: Vec<_> = table.canonical_codes().collect();
            let canonical = codes[index % codes.len()];
            prop_assert_eq!(table.to_canonical(table.to_native(canonical)), canonical);
        }
    }
}
