//! Bucket management helpers used by the CLI.

use tracing::{error, info};

use crate::config::validate_bucket_name;
use crate::store::ObjectStore;

/// Create `bucket`, in `region` when given.
///
/// Failures are logged, not returned: the answer is only whether the
/// bucket was created.
pub async fn create_bucket<S>(store: &S, bucket: &str, region: Option<&str>) -> bool
where
    S: ObjectStore + ?Sized,
{
    if let Err(e) = validate_bucket_name(bucket) {
        error!("{}", e);
        return false;
    }
    match store.create_bucket(bucket, region).await {
        Ok(()) => {
            info!(
                "Created bucket {} in {}",
                bucket,
                region.unwrap_or("the default region")
            );
            true
        }
        Err(e) => {
            error!("Failed to create bucket {}: {:#}", bucket, e);
            false
        }
    }
}

/// Names of every bucket the credentials can see.
pub async fn list_buckets<S>(store: &S) -> anyhow::Result<Vec<String>>
where
    S: ObjectStore + ?Sized,
{
    let mut names = store.list_buckets().await?;
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreCall};

    #[tokio::test]
    async fn test_create_bucket_reports_success() {
        let store = MemoryStore::new();
        assert!(create_bucket(&store, "fresh-bucket", Some("eu-west-1")).await);
        assert_eq!(
            store.calls(),
            vec![StoreCall::CreateBucket {
                bucket: "fresh-bucket".into(),
                region: Some("eu-west-1".into()),
            }]
        );
    }

    #[tokio::test]
    async fn test_create_bucket_reports_store_failure() {
        let store = MemoryStore::new();
        store.insert("taken-bucket", "k", "v");
        assert!(!create_bucket(&store, "taken-bucket", None).await);
    }

    #[tokio::test]
    async fn test_create_bucket_rejects_invalid_name_without_calling_store() {
        let store = MemoryStore::new();
        assert!(!create_bucket(&store, "Not_Valid", None).await);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_buckets_sorted() {
        let store = MemoryStore::new();
        store.insert("zeta", "k", "v");
        store.insert("alpha", "k", "v");
        assert_eq!(list_buckets(&store).await.unwrap(), vec!["alpha", "zeta"]);
    }
}
