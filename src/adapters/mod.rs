//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `gateway`: Subscriber WebSocket server
//! - `metrics`: Prometheus metrics export and health checks
//! - `store`: Firebase / local-file catalog and token store
//! - `upstream`: Upstox LTP REST client

pub mod gateway;
pub mod metrics;
pub mod store;
pub mod upstream;
