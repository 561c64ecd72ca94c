//! Subscriber Port - Snapshot Delivery Channel
//!
//! A subscriber is one live downstream connection. The broadcast loop
//! only needs an identity and a fallible send; accept and disconnect
//! detection belong to the gateway adapter.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DeliveryError;

/// Unique identity of a connected subscriber.
pub type SubscriberId = uuid::Uuid;

/// Trait for snapshot delivery channels.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
  /// Stable identity for the lifetime of the connection.
  fn id(&self) -> SubscriberId;

  /// Hand one serialized snapshot to the connection.
  ///
  /// An error means the subscriber should be considered dead.
  async fn send(&self, payload: Arc<str>) -> Result<(), DeliveryError>;
}
