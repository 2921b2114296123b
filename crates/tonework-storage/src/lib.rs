//! S3-compatible blob store client.
//!
//! This crate provides:
//! - The `BlobStore` trait the task pipeline depends on
//! - An `aws-sdk-s3` implementation for MinIO and other S3 endpoints
//! - Bucket existence checks and creation

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3BlobStore, S3Config};
pub use error::{StorageError, StorageResult};
pub use store::BlobStore;
