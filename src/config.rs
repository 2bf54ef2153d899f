use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Where uploaded images end up.
#[derive(Debug, Clone, Deserialize)]
pub enum MediaConfig {
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
        /// Base of the publicly reachable object URL, without trailing slash.
        public_url: String,
    },
    Cloudinary {
        cloud_name: String,
        api_key: String,
        api_secret: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub media: MediaConfig,
    pub upload_dir: String,
    pub cors_origin: Option<String>,
    pub cookie_secure: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userhub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userhub-clients".into()),
            access_ttl_minutes: parsed("ACCESS_TOKEN_TTL_MINUTES").unwrap_or(15),
            refresh_ttl_minutes: parsed("REFRESH_TOKEN_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };
        anyhow::ensure!(
            jwt.access_secret != jwt.refresh_secret,
            "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ"
        );

        let media = match std::env::var("MEDIA_BACKEND")
            .unwrap_or_else(|_| "s3".into())
            .to_lowercase()
            .as_str()
        {
            "s3" => {
                let endpoint = required("S3_ENDPOINT")?;
                let bucket = required("S3_BUCKET")?;
                let public_url = std::env::var("S3_PUBLIC_URL")
                    .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
                MediaConfig::S3 {
                    endpoint,
                    bucket,
                    access_key: required("S3_ACCESS_KEY")?,
                    secret_key: required("S3_SECRET_KEY")?,
                    region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
                    public_url: public_url.trim_end_matches('/').to_string(),
                }
            }
            "cloudinary" => MediaConfig::Cloudinary {
                cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
            },
            other => anyhow::bail!("unknown MEDIA_BACKEND {other:?}, expected s3 or cloudinary"),
        };

        Ok(Self {
            database_url,
            jwt,
            media,
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./public/temp".into()),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|v| !v.trim().is_empty()),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing env var {key}"))
}

fn parsed(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse::<i64>().ok())
}
