//! External tool execution for audio workers.
//!
//! This crate provides:
//! - Scoped scratch workspaces (`input/`, `output/`)
//! - A subprocess runner with timeout and captured output
//! - Artifact lookup with a bounded fallback search
//! - Adapters for the supported audio tools

pub mod artifact;
pub mod command;
pub mod error;
pub mod runner;
pub mod tools;
pub mod workspace;

pub use artifact::{ArtifactLocator, Located};
pub use command::{CommandOutput, CommandRunner, ToolCommand};
pub use error::{MediaError, MediaResult};
pub use runner::{ToolOutcome, ToolRunner};
pub use tools::{
    resolve_device, AudioTool, DemucsConfig, DemucsTool, DenoiseConfig, HistoricalDenoiseTool,
    ToolKind, WhisperConfig, WhisperTool,
};
pub use workspace::Workspace;
