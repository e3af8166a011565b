//! s3mirror library: mirror an object-store bucket into a local directory.
//!
//! The [`mirror`](mirror::mirror) function pages through every key under a
//! prefix, creates a local directory for each directory marker, and
//! downloads each remaining object to the matching path under the local
//! root.  Store access goes through the [`store::ObjectStore`] trait, with
//! an AWS S3 implementation for real buckets and an in-memory one for tests.

pub mod bucket;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod mirror;
pub mod staging;
pub mod store;

pub use errors::MirrorError;
pub use mirror::{mirror, MirrorOptions, MirrorReport};
