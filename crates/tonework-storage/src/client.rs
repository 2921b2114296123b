//! S3-compatible client implementation (MinIO).

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint URL including scheme
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Default bucket for tasks that do not name one
    pub bucket_name: String,
    /// Region (MinIO ignores it, the SDK requires one)
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let endpoint = std::env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "localhost:9000".to_string());
        let use_ssl = std::env::var("MINIO_USE_SSL")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            endpoint_url: endpoint_url(&endpoint, use_ssl),
            access_key_id: std::env::var("MINIO_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("MINIO_ACCESS_KEY not set"))?,
            secret_access_key: std::env::var("MINIO_SECRET_KEY")
                .map_err(|_| StorageError::config_error("MINIO_SECRET_KEY not set"))?,
            bucket_name: std::env::var("MINIO_BUCKET_NAME").unwrap_or_else(|_| "audio-bucket".to_string()),
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Prefix `endpoint` with a scheme unless it already carries one.
fn endpoint_url(endpoint: &str, use_ssl: bool) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if use_ssl {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    }
}

/// Blob store backed by an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    default_bucket: String,
}

impl S3BlobStore {
    /// Create a new client from configuration.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "minio",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            default_bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }

    /// Bucket used when a task does not name one.
    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn fetch(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<()> {
        debug!("Downloading {}/{} to {}", bucket, key, dest.display());

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = format!("{:?}", e);
                if message.contains("NoSuchKey") || message.contains("NoSuchBucket") {
                    StorageError::not_found(format!("{}/{}", bucket, key))
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let bytes = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to write file: {}", e)))?;
        file.flush().await?;

        info!("Downloaded {}/{} ({} bytes)", bucket, key, bytes);
        Ok(())
    }

    async fn store(&self, bucket: &str, key: &str, src: &Path, content_type: &str) -> StorageResult<()> {
        debug!("Uploading {} to {}/{}", src.display(), bucket, key);

        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}/{}", src.display(), bucket, key);
        Ok(())
    }

    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                debug!("Bucket {} exists", bucket);
                return Ok(());
            }
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if !missing {
                    return Err(StorageError::bucket_failed(format!(
                        "head_bucket {}: {}",
                        bucket, e
                    )));
                }
            }
        }

        info!("Creating bucket {}", bucket);
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let already_ours = e
                    .as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists())
                    .unwrap_or(false);
                if already_ours {
                    warn!("Bucket {} was created concurrently", bucket);
                    Ok(())
                } else {
                    Err(StorageError::bucket_failed(format!(
                        "create_bucket {}: {}",
                        bucket, e
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_scheme() {
        assert_eq!(endpoint_url("minio:9000", false), "http://minio:9000");
        assert_eq!(endpoint_url("minio:9000", true), "https://minio:9000");
        assert_eq!(endpoint_url("http://minio:9000/", true), "http://minio:9000");
    }

    #[test]
    fn test_client_construction() {
        let store = S3BlobStore::new(S3Config {
            endpoint_url: "http://localhost:9000".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            bucket_name: "audio-bucket".to_string(),
            region: "us-east-1".to_string(),
        });
        assert_eq!(store.default_bucket(), "audio-bucket");
    }

    #[tokio::test]
    #[ignore = "requires a running MinIO"]
    async fn test_round_trip_against_minio() {
        let store = S3BlobStore::from_env().unwrap();
        let bucket = store.default_bucket().to_string();
        store.ensure_bucket(&bucket).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.txt");
        tokio::fs::write(&src, b"hello").await.unwrap();
        store.store(&bucket, "selftest/in.txt", &src, "text/plain").await.unwrap();

        let dest = dir.path().join("out.txt");
        store.fetch(&bucket, "selftest/in.txt", &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");
    }
}
