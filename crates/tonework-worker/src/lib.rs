//! Audio task worker.
//!
//! This crate provides:
//! - Task processor (fetch, run tool, store)
//! - Message handler deciding results and acknowledgements
//! - Worker configuration, logging and metrics

pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod processor;

#[cfg(test)]
mod testing;

pub use config::{ResultDelivery, WorkerConfig};
pub use consumer::TaskConsumer;
pub use error::{WorkerError, WorkerResult};
pub use logging::TaskLogger;
pub use processor::TaskProcessor;
