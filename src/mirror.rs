//! Bucket-to-directory mirroring.
//!
//! A mirror run has three phases:
//!
//! 1. page through every key under the prefix and split the keys into
//!    directory markers (ending in `/`) and file keys,
//! 2. create a local directory for every marker,
//! 3. download every file key to `local_root/key`.
//!
//! Phase 2 finishes before the first download starts.  Downloads run in
//! listing order unless `concurrency` is raised.  A listing failure aborts
//! the run; a failed download is logged and recorded in the
//! [`MirrorReport`] unless `fail_fast` is set.

use std::path::{Component, Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::MirrorError;
use crate::metrics::{
    BYTES_DOWNLOADED_TOTAL, DIRECTORIES_CREATED_TOTAL, LIST_PAGES_TOTAL,
    OBJECTS_DOWNLOADED_TOTAL, OBJECTS_FAILED_TOTAL,
};
use crate::store::ObjectStore;

/// Key separator used by object stores.
pub const SEPARATOR: char = '/';

/// What a listed key stands for locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Key ends in `/`: an (often empty) folder.
    DirectoryMarker,
    /// Anything else, including the empty key.
    File,
}

/// Classify a key by its last character.
pub fn classify_key(key: &str) -> KeyKind {
    if key.ends_with(SEPARATOR) {
        KeyKind::DirectoryMarker
    } else {
        KeyKind::File
    }
}

/// Map `key` onto a path under `root`.
///
/// Empty and `.` segments are dropped, so `a//b` and `/a/b` both land on
/// `root/a/b`.  Any segment that would climb out of `root` (`..`, a drive
/// prefix, a backslash-separated `..` on Windows) rejects the whole key.
pub fn local_path(root: &Path, key: &str) -> Result<PathBuf, MirrorError> {
    let mut path = root.to_path_buf();
    for segment in key.split(SEPARATOR).filter(|s| !s.is_empty()) {
        for component in Path::new(segment).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(MirrorError::UnsafeKey {
                        key: key.to_string(),
                    })
                }
            }
        }
    }
    Ok(path)
}

/// Like [`local_path`], but a file key must name something below `root`.
fn local_file_path(root: &Path, key: &str) -> Result<PathBuf, MirrorError> {
    let path = local_path(root, key)?;
    if path == root {
        return Err(MirrorError::UnsafeKey {
            key: key.to_string(),
        });
    }
    Ok(path)
}

/// Parameters of one mirror run.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Bucket to read from.
    pub bucket: String,
    /// Only keys starting with this are mirrored.  Empty means all.
    pub prefix: String,
    /// Directory the bucket is mirrored into.
    pub local_root: PathBuf,
    /// Downloads in flight at once.
    pub concurrency: usize,
    /// Stop at the first failed download.
    pub fail_fast: bool,
}

impl MirrorOptions {
    pub fn new(bucket: impl Into<String>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
            local_root: local_root.into(),
            concurrency: 1,
            fail_fast: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Options for the bucket and mirror settings in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.source.bucket.clone(), &config.mirror.local_root)
            .with_prefix(config.mirror.prefix.clone())
            .with_concurrency(config.mirror.concurrency)
            .with_fail_fast(config.mirror.fail_fast)
    }
}

/// Keys collected by the listing phase, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorPlan {
    /// Directory-marker keys.
    pub dirs: Vec<String>,
    /// File keys.
    pub files: Vec<String>,
    /// Number of listing pages requested.
    pub pages: usize,
}

/// A file key that could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedObject {
    pub key: String,
    pub reason: String,
}

/// Outcome of a completed mirror run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Listing pages requested.
    pub pages: usize,
    /// Directory markers materialized locally.
    pub directories: usize,
    /// Files written.
    pub downloaded: usize,
    /// Bytes written across all files.
    pub bytes: u64,
    /// Files that failed, in completion order.
    pub failed: Vec<FailedObject>,
    /// Keys refused because they would escape the local root.
    pub skipped_unsafe: Vec<String>,
}

impl MirrorReport {
    /// No download failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Page through `bucket` under `prefix` and classify every key.
///
/// Stops when a page carries no continuation token.  An empty-string token
/// is a token like any other and is sent back as is.
pub async fn collect_plan<S>(
    store: &S,
    bucket: &str,
    prefix: &str,
) -> Result<MirrorPlan, MirrorError>
where
    S: ObjectStore + ?Sized,
{
    let mut plan = MirrorPlan::default();
    let mut token: Option<String> = None;

    loop {
        let page = store
            .list_page(bucket, prefix, token.as_deref())
            .await
            .map_err(|source| MirrorError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source,
            })?;
        plan.pages += 1;
        counter!(LIST_PAGES_TOTAL).increment(1);
        debug!(
            "Listed page {} of s3://{}/{}: {} keys",
            plan.pages,
            bucket,
            prefix,
            page.keys.len()
        );

        for key in page.keys {
            match classify_key(&key) {
                KeyKind::DirectoryMarker => plan.dirs.push(key),
                KeyKind::File => plan.files.push(key),
            }
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(plan)
}

async fn create_dir(path: &Path) -> Result<(), MirrorError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| MirrorError::Filesystem {
            path: path.to_path_buf(),
            source,
        })
}

/// Reject `path` when its deepest existing ancestor resolves outside
/// `canonical_root`, e.g. through a symlink planted under the local root.
async fn ensure_within(
    canonical_root: &Path,
    path: &Path,
    key: &str,
) -> Result<(), MirrorError> {
    for ancestor in path.ancestors() {
        match tokio::fs::canonicalize(ancestor).await {
            Ok(resolved) if resolved.starts_with(canonical_root) => return Ok(()),
            Ok(_) => {
                return Err(MirrorError::UnsafeKey {
                    key: key.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(MirrorError::Filesystem {
                    path: ancestor.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(())
}

/// Download one file key of a mirror run into its mapped path.
async fn fetch<'k, S>(
    store: &S,
    options: &MirrorOptions,
    canonical_root: &Path,
    key: &'k str,
) -> (&'k str, Result<u64, MirrorError>)
where
    S: ObjectStore + ?Sized,
{
    let result = async {
        let destination = local_file_path(&options.local_root, key)?;
        ensure_within(canonical_root, &destination, key).await?;
        if let Some(parent) = destination.parent() {
            create_dir(parent).await?;
        }
        store
            .download(&options.bucket, key, &destination)
            .await
            .map_err(|source| MirrorError::Download {
                key: key.to_string(),
                source,
            })
    }
    .await;
    (key, result)
}

/// Mirror every object under `options.prefix` into `options.local_root`.
pub async fn mirror<S>(store: &S, options: &MirrorOptions) -> Result<MirrorReport, MirrorError>
where
    S: ObjectStore + ?Sized,
{
    let plan = collect_plan(store, &options.bucket, &options.prefix).await?;
    info!(
        "Found {} files and {} directory markers in s3://{}/{} ({} pages)",
        plan.files.len(),
        plan.dirs.len(),
        options.bucket,
        options.prefix,
        plan.pages
    );

    let mut report = MirrorReport {
        pages: plan.pages,
        ..MirrorReport::default()
    };

    create_dir(&options.local_root).await?;
    let canonical_root = tokio::fs::canonicalize(&options.local_root)
        .await
        .map_err(|source| MirrorError::Filesystem {
            path: options.local_root.clone(),
            source,
        })?;

    // Every marker directory exists before the first download is issued.
    for key in &plan.dirs {
        let dir = match local_path(&options.local_root, key) {
            Ok(dir) => ensure_within(&canonical_root, &dir, key).await.map(|()| dir),
            Err(err) => Err(err),
        };
        match dir {
            Ok(dir) => {
                create_dir(&dir).await?;
                report.directories += 1;
                counter!(DIRECTORIES_CREATED_TOTAL).increment(1);
            }
            Err(err @ MirrorError::Filesystem { .. }) => return Err(err),
            Err(err) => {
                warn!("Skipping directory marker: {}", err);
                report.skipped_unsafe.push(key.clone());
            }
        }
    }

    let mut downloads = stream::iter(&plan.files)
        .map(|key| fetch(store, options, &canonical_root, key))
        .buffer_unordered(options.concurrency.max(1));

    while let Some((key, outcome)) = downloads.next().await {
        match outcome {
            Ok(bytes) => {
                info!("downloaded - {}", key);
                report.downloaded += 1;
                report.bytes += bytes;
                counter!(OBJECTS_DOWNLOADED_TOTAL).increment(1);
                counter!(BYTES_DOWNLOADED_TOTAL).increment(bytes);
            }
            Err(err @ MirrorError::UnsafeKey { .. }) => {
                warn!("Skipping object: {}", err);
                report.skipped_unsafe.push(key.to_string());
            }
            Err(err) => {
                error!("Failed to download {}: {}", key, error_chain(&err));
                counter!(OBJECTS_FAILED_TOTAL, "kind" => err.kind()).increment(1);
                if options.fail_fast {
                    return Err(err);
                }
                report.failed.push(FailedObject {
                    key: key.to_string(),
                    reason: error_chain(&err),
                });
            }
        }
    }

    Ok(report)
}

/// Fetch a single object to `destination`, creating its parent directory.
pub async fn download_one<S>(
    store: &S,
    bucket: &str,
    key: &str,
    destination: &Path,
) -> Result<u64, MirrorError>
where
    S: ObjectStore + ?Sized,
{
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent).await?;
    }
    let bytes = store
        .download(bucket, key, destination)
        .await
        .map_err(|source| MirrorError::Download {
            key: key.to_string(),
            source,
        })?;
    info!("downloaded {}", key);
    Ok(bytes)
}

/// Default local name for a single download: the key's last segment.
pub fn default_destination(key: &str) -> Option<PathBuf> {
    key.rsplit(SEPARATOR)
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(PathBuf::from)
}

/// `outer: inner: root` rendering of an error and its sources.
fn error_chain(err: &MirrorError) -> String {
    let mut rendered = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

// -- Tests -------------------------------------------------------------------
