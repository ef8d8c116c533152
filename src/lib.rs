//! Metron Stream — Library Root
//!
//! Real-time market data distribution engine: one hot-swappable
//! ingestion strategy feeding any number of subscribers.
//! Re-exports all modules for the binary, integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
