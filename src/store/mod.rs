//! Object store access.
//!
//! The [`client::ObjectStore`] trait is everything the mirror needs from a
//! remote store: paginated listing, single-object download, and bucket
//! management.  Implementations are a gateway to AWS S3 (or any
//! S3-compatible endpoint) and an in-memory store used by tests.

pub mod aws;
pub mod client;
pub mod memory;

pub use client::{ListPage, ObjectStore};
