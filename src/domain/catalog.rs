//! Symbol catalog and instrument index.
//!
//! The catalog maps each configured category (e.g. `nifty50`) to the
//! symbols it contains and the provider instrument key for each symbol.
//! It is rebuilt from the store on every tick and flattened into an
//! [`InstrumentIndex`] for the batched quote request.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Opaque provider instrument identifier (e.g. `NSE_EQ|INE002A01018`).
pub type InstrumentKey = String;

/// Category name such as `nifty50`.
pub type Category = String;

/// Business-level symbol name such as `RELIANCE`.
pub type Symbol = String;

/// Category → symbol → instrument key, for a fixed set of categories.
///
/// Ordered maps keep the broadcast payload stable between ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    categories: BTreeMap<Category, BTreeMap<Symbol, InstrumentKey>>,
}

impl Catalog {
    /// A catalog with every given category present and empty.
    pub fn empty<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Category>,
    {
        Self {
            categories: categories
                .into_iter()
                .map(|c| (c.into(), BTreeMap::new()))
                .collect(),
        }
    }

    /// Normalize a raw store document into a catalog of `categories`.
    ///
    /// Accepts symbol values that are either a plain identifier string or
    /// an object carrying an `instrument_key` string. Anything else is
    /// skipped. Categories absent from `raw` stay present and empty;
    /// categories not listed in `categories` are ignored.
    pub fn from_raw(categories: &[Category], raw: &Value) -> Self {
        let mut catalog = Self::empty(categories.iter().cloned());

        for (category, symbols) in &mut catalog.categories {
            let Some(entries) = raw.get(category).and_then(Value::as_object) else {
                debug!(category = %category, "Category missing from store document");
                continue;
            };

            for (symbol, value) in entries {
                match instrument_key_of(value) {
                    Some(key) => {
                        symbols.insert(symbol.clone(), key.to_string());
                    }
                    None => {
                        debug!(
                            category = %category,
                            symbol = %symbol,
                            "Skipping catalog entry without an instrument key"
                        );
                    }
                }
            }
        }

        catalog
    }

    /// Insert or replace a symbol, creating the category if needed.
    pub fn insert(
        &mut self,
        category: impl Into<Category>,
        symbol: impl Into<Symbol>,
        key: impl Into<InstrumentKey>,
    ) {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(symbol.into(), key.into());
    }

    /// True when no category holds any symbol.
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(BTreeMap::is_empty)
    }

    /// Total number of (category, symbol) entries.
    pub fn symbol_count(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    /// Number of categories, empty ones included.
    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Iterate categories in name order.
    pub fn categories(
        &self,
    ) -> impl Iterator<Item = (&Category, &BTreeMap<Symbol, InstrumentKey>)> {
        self.categories.iter()
    }

    /// Symbols of a single category.
    pub fn category(&self, name: &str) -> Option<&BTreeMap<Symbol, InstrumentKey>> {
        self.categories.get(name)
    }
}

fn instrument_key_of(value: &Value) -> Option<&str> {
    let key = match value {
        Value::String(s) => s.as_str(),
        Value::Object(fields) => fields.get("instrument_key")?.as_str()?,
        _ => return None,
    };
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}

/// Where an instrument key lives in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    pub category: Category,
    pub symbol: Symbol,
}

/// An instrument key claimed by more than one catalog entry.
///
/// `kept` is the entry the reverse index resolves to; `shadowed` lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCollision {
    pub key: InstrumentKey,
    pub kept: SymbolRef,
    pub shadowed: SymbolRef,
}

/// Flattened view of a catalog for one batched quote request.
#[derive(Debug, Clone, Default)]
pub struct InstrumentIndex {
    /// Every distinct instrument key, in first-seen order.
    pub ids: Vec<InstrumentKey>,
    /// Instrument key → owning (category, symbol). Last entry seen wins.
    pub reverse: HashMap<InstrumentKey, SymbolRef>,
    /// Keys that appeared under more than one symbol.
    pub collisions: Vec<KeyCollision>,
}

impl InstrumentIndex {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Option<&SymbolRef> {
        self.reverse.get(key)
    }
}

/// Flatten `catalog` into a request list and a reverse index.
///
/// Walks categories, then symbols, in name order. When the same key is
/// listed under two symbols the later one wins and the collision is
/// recorded and logged.
pub fn build_instrument_index(catalog: &Catalog) -> InstrumentIndex {
    let mut index = InstrumentIndex {
        ids: Vec::with_capacity(catalog.symbol_count()),
        reverse: HashMap::with_capacity(catalog.symbol_count()),
        collisions: Vec::new(),
    };

    for (category, symbols) in catalog.categories() {
        for (symbol, key) in symbols {
            let entry = SymbolRef {
                category: category.clone(),
                symbol: symbol.clone(),
            };

            match index.reverse.insert(key.clone(), entry.clone()) {
                None => index.ids.push(key.clone()),
                Some(previous) => {
                    warn!(
                        key = %key,
                        kept_category = %entry.category,
                        kept_symbol = %entry.symbol,
                        shadowed_category = %previous.category,
                        shadowed_symbol = %previous.symbol,
                        "Instrument key listed twice, last entry wins"
                    );
                    index.collisions.push(KeyCollision {
                        key: key.clone(),
                        kept: entry,
                        shadowed: previous,
                    });
                }
            }
        }
    }

    index
}
