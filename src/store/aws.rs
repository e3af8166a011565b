//! AWS S3 object store.
//!
//! Talks to a real S3 bucket, or any S3-compatible endpoint such as MinIO
//! or LocalStack when `endpoint_url` is set.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use aws_sdk_s3::config::Region;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, info};

use super::client::{ListPage, ObjectStore};
use crate::config::SourceConfig;
use crate::staging::StagedFile;

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Object store backed by the AWS S3 SDK client.
pub struct AwsStore {
    /// AWS S3 SDK client.
    client: Client,
}

impl AwsStore {
    /// Build a client from the source configuration.
    ///
    /// Empty `endpoint_url`, `access_key_id` and `secret_access_key` fall
    /// back to the SDK defaults.
    pub async fn new(source: &SourceConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(source.region.clone()));

        if !source.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&source.endpoint_url);
        }

        // If explicit credentials are provided, inject them as static credentials.
        if !source.access_key_id.is_empty() && !source.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &source.access_key_id,
                &source.secret_access_key,
                None, // session_token
                None, // expiry
                "s3mirror-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(source.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "AWS S3 client initialized: region={} endpoint='{}'",
            source.region, source.endpoint_url
        );

        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {err}")
    }

    /// Location constraint for `region`, or `None` where S3 wants none.
    fn location_for(region: Option<&str>) -> Option<CreateBucketConfiguration> {
        let region = region.filter(|r| !r.is_empty() && *r != DEFAULT_REGION)?;
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        )
    }
}

impl ObjectStore for AwsStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ListPage>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let continuation_token = continuation_token.map(str::to_string);
        Box::pin(async move {
            debug!(
                "AWS list_objects_v2: bucket={} prefix='{}' token={:?}",
                bucket, prefix, continuation_token
            );

            let mut req = self.client.list_objects_v2().bucket(&bucket).prefix(&prefix);
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_objects_v2", e.into_service_error()))?;

            // An absent Contents element comes back as an empty slice.
            let keys = resp
                .contents()
                .iter()
                .filter_map(|obj| obj.key().map(str::to_string))
                .collect();

            Ok(ListPage {
                keys,
                next_token: resp.next_continuation_token().map(str::to_string),
            })
        })
    }

    fn download(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let destination = destination.to_path_buf();
        Box::pin(async move {
            debug!(
                "AWS get_object: bucket={} key={} -> {}",
                bucket,
                key,
                destination.display()
            );

            let resp = self
                .client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        anyhow::anyhow!("Object not found: s3://{bucket}/{key}")
                    } else {
                        Self::map_sdk_error("get_object", service_err)
                    }
                })?;

            let mut body = resp.body;
            let mut staged = StagedFile::create(&destination).await?;
            while let Some(chunk) = body
                .try_next()
                .await
                .map_err(|e| Self::map_sdk_error("get_object body", e))?
            {
                staged.write(&chunk).await?;
            }
            staged.commit().await
        })
    }

    fn create_bucket(
        &self,
        bucket: &str,
        region: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let bucket = bucket.to_string();
        let region = region.map(str::to_string);
        Box::pin(async move {
            debug!("AWS create_bucket: bucket={} region={:?}", bucket, region);

            let location = Self::location_for(region.as_deref());

            // The request has to be signed for the target region, so a
            // region-specific client is built when one is asked for.
            let client = match region.as_deref() {
                Some(r) if location.is_some() => Client::from_conf(
                    self.client
                        .config()
                        .to_builder()
                        .region(Region::new(r.to_string()))
                        .build(),
                ),
                _ => self.client.clone(),
            };

            client
                .create_bucket()
                .bucket(&bucket)
                .set_create_bucket_configuration(location)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("create_bucket", e.into_service_error()))?;

            Ok(())
        })
    }

    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            debug!("AWS list_buckets");

            let resp = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_buckets", e.into_service_error()))?;

            Ok(resp
                .buckets()
                .iter()
                .filter_map(|b| b.name().map(str::to_string))
                .collect())
        })
    }
}

// -- Tests -------------------------------------------------------------------
