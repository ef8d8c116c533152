//! Use Cases Layer - Stream Distribution Workflows
//!
//! Orchestrates domain types with port interfaces to implement the
//! engine's runtime behaviour.
//!
//! Use cases:
//! - `StreamOrchestrator`: Owns and hot-swaps the active ingestion strategy
//! - `Strategy`: Push / poll ingestion run-loops
//! - `SubscriberRegistry`: Bounded per-subscriber fan-out of tickers
//! - `ConnectionManager`: Broadcast to live transport connections
//! - `ResilientPoller`: Periodic sentiment/trades/arbitrage cycle
//! - `ArbitrageScanner`: Concurrent cross-venue ticker comparison
//! - `VenueDirectory`: Exchange id to adapter lookup

pub mod arbitrage;
pub mod connections;
pub mod ingestion;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod venues;

pub use arbitrage::ArbitrageScanner;
pub use connections::{BroadcastReport, ConnectionManager};
pub use ingestion::{Strategy, StrategyGauge, StrategyKind};
pub use orchestrator::{OrchestratorStats, StreamOrchestrator, StreamSettings, StreamSnapshot};
pub use poller::{PollerSettings, PollerStats, ResilientPoller, StepOutcome};
pub use registry::{PublishReport, SubscriberHandle, SubscriberRegistry};
pub use venues::VenueDirectory;
