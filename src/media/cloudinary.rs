use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use super::MediaRelay;

/// Relay backed by the Cloudinary upload API (signed uploads).
#[derive(Clone)]
pub struct CloudinaryRelay {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl CloudinaryRelay {
    pub fn new(cloud_name: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("https://api.cloudinary.com/v1_1/{}/auto/upload", self.cloud_name)
    }
}

/// `params` must already be sorted by key.
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{joined}{api_secret}").as_bytes()))
}

#[async_trait]
impl MediaRelay for CloudinaryRelay {
    async fn upload(
        &self,
        file_name: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<String> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let signature = sign(&[("timestamp", timestamp.clone())], &self.api_secret);

        let part = Part::bytes(body.to_vec())
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .context("cloudinary file part")?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let res: UploadResponse = self
            .http
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .context("cloudinary upload request")?
            .error_for_status()
            .context("cloudinary upload status")?
            .json()
            .await
            .context("cloudinary upload response")?;

        res.secure_url
            .or(res.url)
            .context("cloudinary response carried no url")
    }
}
