//! Upstox Quote API Adapter
//!
//! Implements the `QuoteSource` port against the Upstox v2
//! market-quote LTP endpoint.
//!
//! Sub-modules:
//! - `client`: HTTP client with timeout and bounded retries
//! - `types`: LTP response shapes

pub mod client;
pub mod types;

pub use client::{UpstoxClient, UpstoxClientConfig};
