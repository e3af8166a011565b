//! In-memory object store.
//!
//! Objects live in a per-bucket `BTreeMap`, so listings come back in
//! lexicographic key order like S3.  Every call is appended to a call log,
//! which lets tests assert on request order.  Listing can also be scripted
//! page by page, and individual operations can be made to fail.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};

use super::client::{ListPage, ObjectStore};
use crate::staging::StagedFile;

/// A call received by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List {
        bucket: String,
        prefix: String,
        token: Option<String>,
    },
    Download {
        bucket: String,
        key: String,
        destination: PathBuf,
    },
    CreateBucket {
        bucket: String,
        region: Option<String>,
    },
    ListBuckets,
}

#[derive(Default)]
struct Inner {
    /// bucket -> key -> data
    buckets: HashMap<String, BTreeMap<String, Bytes>>,
    /// bucket -> pages returned verbatim instead of paging `buckets`.
    scripted: HashMap<String, Vec<ListPage>>,
    failing_keys: HashSet<String>,
    /// Listing fails once this many pages have been served.
    fail_listing_after: Option<usize>,
    pages_served: usize,
    calls: Vec<StoreCall>,
}

/// In-memory [`ObjectStore`].
pub struct MemoryStore {
    page_size: usize,
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with S3's default page size of 1000 keys.
    pub fn new() -> Self {
        Self {
            page_size: 1000,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Serve at most `page_size` keys per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `data` at `bucket/key`, creating the bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Answer listings of `bucket` with `pages` instead of paging the
    /// stored objects.  Page `n + 1` is served for the token carried by
    /// page `n`.
    pub fn script_pages(&self, bucket: &str, pages: Vec<ListPage>) {
        self.lock().scripted.insert(bucket.to_string(), pages);
    }

    /// Make every download of `key` fail.
    pub fn fail_download(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    /// Fail every listing call after `pages` successful ones.
    pub fn fail_listing_after(&self, pages: usize) {
        self.lock().fail_listing_after = Some(pages);
    }

    /// Everything received so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Listing calls only.
    pub fn list_calls(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::List { .. }))
            .collect()
    }

    /// Keys passed to `download` so far, in call order.
    pub fn download_requests(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Download { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    fn scripted_page(pages: &[ListPage], token: Option<&str>) -> anyhow::Result<ListPage> {
        let index = match token {
            None => 0,
            Some(token) => pages
                .iter()
                .position(|p| p.next_token.as_deref() == Some(token))
                .map(|i| i + 1)
                .ok_or_else(|| anyhow::anyhow!("InvalidToken: {token}"))?,
        };
        pages
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("InvalidToken: no page after {token:?}"))
    }

    /// Page through stored keys.  The token is the offset of the next key.
    fn stored_page(
        &self,
        objects: Option<&BTreeMap<String, Bytes>>,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> anyhow::Result<ListPage> {
        let objects =
            objects.ok_or_else(|| anyhow::anyhow!("NoSuchBucket: {bucket}"))?;
        let offset = match token {
            None => 0,
            Some(t) => t
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("InvalidToken: {t}"))?,
        };

        let matching: Vec<&String> = objects.keys().filter(|k| k.starts_with(prefix)).collect();
        let end = (offset + self.page_size).min(matching.len());
        let keys = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|k| k.to_string())
            .collect();
        let next_token = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage { keys, next_token })
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ListPage>> + Send + '_>> {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                token: continuation_token.map(str::to_string),
            });

            if inner
                .fail_listing_after
                .is_some_and(|limit| inner.pages_served >= limit)
            {
                Err(anyhow::anyhow!("AccessDenied: listing {bucket}"))
            } else {
                let page = match inner.scripted.get(bucket) {
                    Some(pages) => Self::scripted_page(pages, continuation_token),
                    None => self.stored_page(
                        inner.buckets.get(bucket),
                        bucket,
                        prefix,
                        continuation_token,
                    ),
                };
                if page.is_ok() {
                    inner.pages_served += 1;
                }
                page
            }
        };
        Box::pin(async move { result })
    }

    fn download(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        let data = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::Download {
                bucket: bucket.to_string(),
                key: key.to_string(),
                destination: destination.to_path_buf(),
            });

            if inner.failing_keys.contains(key) {
                Err(anyhow::anyhow!("InternalError: injected failure for {key}"))
            } else {
                inner
                    .buckets
                    .get(bucket)
                    .and_then(|objects| objects.get(key))
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Object not found: s3://{bucket}/{key}"))
            }
        };
        let destination = destination.to_path_buf();
        Box::pin(async move {
            let data = data?;
            let mut staged = StagedFile::create(&destination).await?;
            staged.write(&data).await?;
            staged.commit().await
        })
    }

    fn create_bucket(
        &self,
        bucket: &str,
        region: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::CreateBucket {
                bucket: bucket.to_string(),
                region: region.map(str::to_string),
            });
            if inner.buckets.contains_key(bucket) {
                Err(anyhow::anyhow!("BucketAlreadyOwnedByYou: {bucket}"))
            } else {
                inner.buckets.insert(bucket.to_string(), BTreeMap::new());
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
        let names = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::ListBuckets);
            let mut names: Vec<String> = inner.buckets.keys().cloned().collect();
            names.sort();
            names
        };
        Box::pin(async move { Ok(names) })
    }
}
