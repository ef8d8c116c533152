//! Analytics Adapters - External Sentiment Computation

pub mod remote;

pub use remote::RemoteSentiment;
