use std::sync::Arc;

use anyhow::Context;

use crate::auth::jwt::JwtKeys;
use crate::config::{AppConfig, MediaConfig};
use crate::db;
use crate::media::{CloudinaryRelay, MediaRelay, S3Relay};
use crate::users::repo::{PgUserStore, UserStore};

/// Process-wide handles, built once at startup and cloned into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtKeys>,
    pub users: Arc<dyn UserStore>,
    pub media: Arc<dyn MediaRelay>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;
        let users = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;

        let media = match &config.media {
            MediaConfig::S3 {
                endpoint,
                bucket,
                access_key,
                secret_key,
                region,
                public_url,
            } => Arc::new(
                S3Relay::new(endpoint, bucket, access_key, secret_key, region, public_url)
                    .await?,
            ) as Arc<dyn MediaRelay>,
            MediaConfig::Cloudinary {
                cloud_name,
                api_key,
                api_secret,
            } => Arc::new(CloudinaryRelay::new(cloud_name, api_key, api_secret))
                as Arc<dyn MediaRelay>,
        };

        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| format!("create upload dir {}", config.upload_dir))?;

        Ok(Self::from_parts(config, users, media))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        media: Arc<dyn MediaRelay>,
    ) -> Self {
        let jwt = Arc::new(JwtKeys::from_config(&config.jwt));
        Self {
            config,
            jwt,
            users,
            media,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::testing::test_env;

    #[test]
    fn signing_keys_are_built_once_and_shared() {
        let env = test_env();
        let cloned = env.state.clone();
        assert!(Arc::ptr_eq(&env.state.jwt, &cloned.jwt));

        let user = crate::testing::sample_user("erin");
        let token = cloned.jwt.sign_access(&user).unwrap();
        assert_eq!(env.state.jwt.verify_access(&token).unwrap().sub, user.id);
    }
}
