//! Media backend for profile pictures. The store keeps object keys; URLs are
//! derived from the key whenever an account is rendered.

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::config::StorageConfig;

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
    /// Address clients use to fetch `key`.
    fn url_for(&self, key: &str) -> String;
}

/// S3-compatible bucket (MinIO in development), addressed path-style.
#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    base_url: String,
}

impl S3MediaStore {
    pub async fn connect(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "env");
        let sdk = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let s3 = S3ConfigBuilder::from(&sdk)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        debug!(endpoint = %cfg.endpoint, bucket = %cfg.bucket, "media store configured");
        Ok(Self {
            client: Client::from_conf(s3),
            bucket: cfg.bucket.clone(),
            base_url: cfg.public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn store(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(i64::try_from(size)?)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("upload {key}"))?;
        debug!(%key, size, "media object stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("delete {key}"))?;
        debug!(%key, "media object removed");
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

/// File extension for a picture's content type; unknown types get `bin`.
fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "bin",
    }
}

/// Fresh object key for an account's picture; every upload gets its own.
pub fn profile_picture_key(account_id: Uuid, content_type: &str) -> String {
    format!(
        "profiles/{account_id}/{}.{}",
        Uuid::new_v4(),
        extension_for(content_type)
    )
}
