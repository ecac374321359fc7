//! Stream coordinator for the streamer.
//!
//! This crate owns "the one active stream": it picks a transport adapter,
//! serializes lifecycle transitions, samples metrics on a fixed tick and
//! fans adapter events out to subscribers.

mod coordinator;
mod error;
mod events;
mod factory;
mod sampler;

pub use coordinator::{StreamCoordinator, METRICS_INTERVAL};
pub use error::{StreamError, StreamResult};
pub use events::EventBus;
pub use factory::{AdapterFactory, DefaultAdapterFactory};
pub use sampler::MetricsSampler;
