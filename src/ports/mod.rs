//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `CatalogStore`: Bearer token and symbol catalog source
//! - `QuoteSource`: Batched last-traded-price lookup
//! - `Subscriber`: Snapshot delivery to one downstream connection

pub mod catalog_store;
pub mod quote_source;
pub mod subscriber;

pub use catalog_store::CatalogStore;
pub use quote_source::QuoteSource;
pub use subscriber::{Subscriber, SubscriberId};
