//! Price snapshot assembly.
//!
//! A snapshot is the unit pushed to subscribers: every catalog symbol,
//! grouped by category, with its last-traded price or `null`.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::catalog::{Catalog, Category, InstrumentIndex, InstrumentKey, Symbol};

/// Category → symbol → last-traded price (`None` serializes as `null`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceSnapshot {
    categories: BTreeMap<Category, BTreeMap<Symbol, Option<f64>>>,
}

impl PriceSnapshot {
    /// Every symbol of `catalog` marked unavailable.
    pub fn unavailable(catalog: &Catalog) -> Self {
        Self {
            categories: catalog
                .categories()
                .map(|(category, symbols)| {
                    let prices = symbols.keys().map(|s| (s.clone(), None)).collect();
                    (category.clone(), prices)
                })
                .collect(),
        }
    }

    /// Price for a symbol; outer `None` means the symbol is unknown.
    pub fn price(&self, category: &str, symbol: &str) -> Option<Option<f64>> {
        self.categories.get(category)?.get(symbol).copied()
    }

    /// Number of symbols that carry a price.
    pub fn priced_count(&self) -> usize {
        self.categories
            .values()
            .flat_map(BTreeMap::values)
            .filter(|p| p.is_some())
            .count()
    }

    /// Number of symbols, priced or not.
    pub fn symbol_count(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&Category, &BTreeMap<Symbol, Option<f64>>)> {
        self.categories.iter()
    }

    /// Wire form pushed to subscribers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Reassemble upstream quotes into a snapshot of `catalog`.
///
/// Seeds every catalog symbol as unavailable, then fills each reverse
/// index entry from `quotes`. Quotes for keys not in the index are
/// ignored, so the snapshot never names a symbol outside the catalog.
/// Non-finite prices are treated as missing.
pub fn assemble_snapshot(
    catalog: &Catalog,
    index: &InstrumentIndex,
    quotes: &HashMap<InstrumentKey, f64>,
) -> PriceSnapshot {
    let mut snapshot = PriceSnapshot::unavailable(catalog);

    for (key, target) in &index.reverse {
        let price = quotes.get(key).copied().filter(|p| p.is_finite());
        if let Some(slot) = snapshot
            .categories
            .get_mut(&target.category)
            .and_then(|symbols| symbols.get_mut(&target.symbol))
        {
            *slot = price;
        }
    }

    snapshot
}
