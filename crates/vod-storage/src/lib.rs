//! Object storage for the Vodforge streaming pipeline.
//!
//! This crate provides:
//! - The `ObjectStore` capability trait (put/get/delete/list)
//! - An S3-compatible backend for production buckets
//! - A filesystem backend for development and tests
//! - The storage key layout shared by all workers

pub mod error;
pub mod fs;
pub mod keys;
pub mod s3;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use fs::FsStore;
pub use s3::{S3Config, S3Store};
pub use store::{ObjectInfo, ObjectStore};
