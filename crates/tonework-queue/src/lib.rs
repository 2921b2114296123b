//! AMQP broker layer for tonework workers.
//!
//! This crate provides:
//! - Broker configuration and topology declaration
//! - A pure reconnect state machine and the supervisor that drives it
//! - Sequential message dispatch with explicit acknowledgement
//! - Best-effort result publishing

pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod state;
pub mod supervisor;
pub mod topology;

pub use config::{BrokerConfig, ExchangeType};
pub use delivery::{Acknowledgement, DeliveryAcker, InboundMessage, ResultSink};
pub use dispatch::{drive, ConsumeExit, MessageHandler};
pub use error::{QueueError, QueueResult};
pub use publisher::{PublishTarget, ResultPublisher};
pub use state::{transition, ConnectionEvent, ConnectionState, RetryPolicy};
pub use supervisor::ConnectionSupervisor;
pub use topology::{Declaration, Topology};
