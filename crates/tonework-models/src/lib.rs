//! Shared data models for tonework workers.
//!
//! This crate provides:
//! - Task identifiers and the typed `Task` parsed from inbound messages
//! - The versioned field alias table used by the tolerant inbound schema
//! - Processing results and the outbound result envelope

pub mod envelope;
pub mod error;
pub mod ids;
pub mod result;
pub mod task;

pub use envelope::{ResultEnvelope, ResultStatus};
pub use error::{ModelError, ModelResult};
pub use ids::TaskId;
pub use result::ProcessingResult;
pub use task::{FieldAliases, Task, TaskParser};
