//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, channels).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `exchange`: Binance-compatible REST market data client
//! - `feeds`: Real-time push feeds (Binance WebSocket)
//! - `analytics`: Remote sentiment service client
//! - `transport`: Channel-backed connection handles
//! - `metrics`: Prometheus metrics export and health checks

pub mod analytics;
pub mod exchange;
pub mod feeds;
pub mod metrics;
pub mod transport;
