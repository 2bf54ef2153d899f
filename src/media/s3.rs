use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use std::path::Path;
use uuid::Uuid;

use super::{ext_from_mime, MediaRelay};

/// Relay backed by an S3-compatible bucket (AWS, MinIO, R2).
#[derive(Clone)]
pub struct S3Relay {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3Relay {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
        public_url: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }
}

fn object_key(file_name: &str, content_type: &str) -> String {
    let ext = ext_from_mime(content_type)
        .map(str::to_string)
        .or_else(|| {
            Path::new(file_name)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
        })
        .unwrap_or_else(|| "bin".into());
    format!("images/{}.{}", Uuid::new_v4(), ext)
}

#[async_trait]
impl MediaRelay for S3Relay {
    async fn upload(
        &self,
        file_name: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<String> {
        let key = object_key(file_name, content_type);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;
        Ok(format!("{}/{}", self.public_url, key))
    }
}
