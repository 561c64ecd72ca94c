//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! relay's core workflow.
//!
//! Use cases:
//! - `PriceBroadcaster`: The poll → fetch → broadcast tick loop
//! - `SymbolResolver`: Token and catalog resolution, failing soft
//! - `SubscriberSet`: Live subscriber membership

pub mod price_broadcaster;
pub mod subscriber_set;
pub mod symbol_resolver;

pub use price_broadcaster::{DeliveryReport, LoopState, PriceBroadcaster, TickOutcome};
pub use subscriber_set::SubscriberSet;
pub use symbol_resolver::SymbolResolver;
