//! Subscriber Gateway Adapter
//!
//! Implements the `Subscriber` port over axum WebSockets and owns the
//! accept/disconnect side of subscriber churn.

pub mod websocket;

pub use websocket::{SubscriberGateway, WsSubscriber};
