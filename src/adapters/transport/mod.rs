//! Transport Adapters - Egress Handles for Client Sessions

pub mod channel;

pub use channel::ChannelConnection;
