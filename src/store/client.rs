//! Abstract object store trait.
//!
//! Every store the mirror can read from implements [`ObjectStore`].  The
//! trait speaks in bucket names, keys and local paths so the mirror does
//! not need to know which SDK sits underneath.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// One batch of keys returned by a listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in listing order.
    pub keys: Vec<String>,
    /// Cursor for the next page.  `None` means this was the last page;
    /// `Some("")` is still a cursor and must be passed back.
    pub next_token: Option<String>,
}

impl ListPage {
    /// A page with no continuation.
    pub fn last(keys: Vec<String>) -> Self {
        Self {
            keys,
            next_token: None,
        }
    }

    /// A page followed by another one reachable through `token`.
    pub fn with_next(keys: Vec<String>, token: impl Into<String>) -> Self {
        Self {
            keys,
            next_token: Some(token.into()),
        }
    }
}

/// Async object store contract.
pub trait ObjectStore: Send + Sync {
    /// List one page of keys in `bucket` starting with `prefix`.
    ///
    /// `continuation_token` is `None` for the first page and the previous
    /// page's `next_token` afterwards.
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ListPage>> + Send + '_>>;

    /// Fetch `key` from `bucket` into `destination`, replacing any existing
    /// file.  Returns the number of bytes written.
    fn download(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;

    /// Create `bucket`, optionally pinned to `region`.
    fn create_bucket(
        &self,
        bucket: &str,
        region: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Names of all buckets visible to the caller.
    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>>;
}
