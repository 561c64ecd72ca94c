//! Domain layer - Core relay models.
//!
//! Catalog shape, the instrument index, the per-tick price snapshot, and
//! the error taxonomy. Nothing here performs I/O.

pub mod catalog;
pub mod errors;
pub mod snapshot;

pub use catalog::{
    Catalog, Category, InstrumentIndex, InstrumentKey, KeyCollision, Symbol, SymbolRef,
    build_instrument_index,
};
pub use errors::{DeliveryError, QuoteError, StoreError, TickError};
pub use snapshot::{PriceSnapshot, assemble_snapshot};
