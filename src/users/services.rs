use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use super::{
    dto::{ChangePasswordRequest, LoginRequest, RegisterForm, UpdateAccountRequest},
    repo_types::{DuplicateUser, NewUser, PublicUser, User},
};
use crate::{
    auth::{
        jwt::TokenPair,
        password::{hash_password, verify_password},
    },
    error::ApiError,
    media::{relay_upload, TempUpload},
    state::AppState,
};

const STALE_REFRESH: &str = "Refresh token is expired or used";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when missing or blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn store_error(e: anyhow::Error) -> ApiError {
    if e.downcast_ref::<DuplicateUser>().is_some() {
        ApiError::Conflict(e.to_string())
    } else {
        ApiError::Internal(e)
    }
}

fn signing_failed(e: anyhow::Error) -> ApiError {
    error!(error = %e, "jwt signing failed");
    ApiError::Server("Something went wrong while generating refresh and access token".into())
}

/// Issue a new pair and make its refresh token the only valid one.
async fn start_session(st: &AppState, user: &User) -> Result<TokenPair, ApiError> {
    let pair = st
        .jwt
        .issue_pair(user)
        .map_err(signing_failed)?;
    st.users
        .set_refresh_token(user.id, Some(&pair.refresh_token))
        .await?;
    Ok(pair)
}

pub async fn register(st: &AppState, form: RegisterForm) -> Result<PublicUser, ApiError> {
    let RegisterForm {
        full_name,
        email,
        username,
        password,
        avatar,
        cover_image,
    } = form;

    let password = password.filter(|p| !p.trim().is_empty());
    let (Some(full_name), Some(email), Some(username), Some(password)) =
        (non_blank(full_name), non_blank(email), non_blank(username), password)
    else {
        return Err(ApiError::validation("All fields are required"));
    };
    let email = email.to_lowercase();
    let username = username.to_lowercase();

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }

    if st
        .users
        .find_by_username_or_email(Some(&username), Some(&email))
        .await?
        .is_some()
    {
        warn!(%username, %email, "username or email already registered");
        return Err(ApiError::Conflict(DuplicateUser.to_string()));
    }

    let Some(avatar) = avatar else {
        return Err(ApiError::validation("Avatar file is required"));
    };

    let avatar_url = relay_upload(st.media.as_ref(), Some(avatar)).await;
    let cover_url = relay_upload(st.media.as_ref(), cover_image).await;
    let Some(avatar_url) = avatar_url else {
        return Err(ApiError::Upload("Avatar file upload failed".into()));
    };

    let password_hash = hash_password(&password)?;
    let user = st
        .users
        .create(NewUser {
            username,
            email,
            full_name,
            avatar: avatar_url,
            cover_image: cover_url,
            password_hash,
        })
        .await
        .map_err(store_error)?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user.into())
}

pub async fn login(st: &AppState, req: LoginRequest) -> Result<(TokenPair, PublicUser), ApiError> {
    let username = non_blank(req.username).map(|u| u.to_lowercase());
    let email = non_blank(req.email).map(|e| e.to_lowercase());
    if username.is_none() && email.is_none() {
        return Err(ApiError::validation("Username or email is required"));
    }

    let user = st
        .users
        .find_by_username_or_email(username.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| {
            warn!(?username, ?email, "login for unknown user");
            ApiError::NotFound("User not found".into())
        })?;

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::auth("Invalid user credentials"));
    }

    let pair = start_session(st, &user).await?;
    info!(user_id = %user.id, "user logged in");
    Ok((pair, user.into()))
}

pub async fn logout(st: &AppState, user: &User) -> Result<(), ApiError> {
    st.users.set_refresh_token(user.id, None).await?;
    info!(user_id = %user.id, "user logged out");
    Ok(())
}

/// Exchange a refresh token for a new pair. The presented token must be the
/// one currently stored; the swap to the new token is a single conditional
/// update, so a token can be spent at most once.
pub async fn refresh(st: &AppState, incoming: Option<String>) -> Result<TokenPair, ApiError> {
    let incoming = non_blank(incoming).ok_or_else(|| ApiError::auth("Unauthorized request"))?;

    let keys = &st.jwt;
    let claims = keys.verify_refresh(&incoming).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        ApiError::auth("Invalid refresh token")
    })?;

    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::auth("Invalid refresh token"))?;

    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        warn!(user_id = %user.id, "stale refresh token presented");
        return Err(ApiError::auth(STALE_REFRESH));
    }

    let pair = keys.issue_pair(&user).map_err(signing_failed)?;
    let swapped = st
        .users
        .rotate_refresh_token(user.id, &incoming, &pair.refresh_token)
        .await?;
    if !swapped {
        warn!(user_id = %user.id, "refresh token spent concurrently");
        return Err(ApiError::auth(STALE_REFRESH));
    }

    info!(user_id = %user.id, "access token refreshed");
    Ok(pair)
}

pub async fn change_password(
    st: &AppState,
    user: &User,
    req: ChangePasswordRequest,
) -> Result<(), ApiError> {
    if req.old_password.is_empty() || req.new_password.trim().is_empty() {
        return Err(ApiError::validation("Old and new password are required"));
    }

    if !verify_password(&req.old_password, &user.password_hash)? {
        warn!(user_id = %user.id, "change password with wrong old password");
        return Err(ApiError::auth("Invalid old password"));
    }

    let hash = hash_password(&req.new_password)?;
    st.users.set_password_hash(user.id, &hash).await?;
    info!(user_id = %user.id, "password changed");
    Ok(())
}

pub async fn update_account(
    st: &AppState,
    user: &User,
    req: UpdateAccountRequest,
) -> Result<PublicUser, ApiError> {
    let (Some(full_name), Some(email)) = (non_blank(req.full_name), non_blank(req.email)) else {
        return Err(ApiError::validation("All fields are required"));
    };
    let email = email.to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }

    let updated = st
        .users
        .set_profile(user.id, &full_name, &email)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, "account details updated");
    Ok(updated.into())
}

pub async fn update_avatar(
    st: &AppState,
    user: &User,
    upload: Option<TempUpload>,
) -> Result<PublicUser, ApiError> {
    let upload = upload.ok_or_else(|| ApiError::validation("Avatar file is missing"))?;
    let url = relay_upload(st.media.as_ref(), Some(upload))
        .await
        .ok_or_else(|| ApiError::Upload("Error while uploading avatar".into()))?;

    let updated = st
        .users
        .set_avatar(user.id, &url)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, "avatar updated");
    Ok(updated.into())
}

pub async fn update_cover_image(
    st: &AppState,
    user: &User,
    upload: Option<TempUpload>,
) -> Result<PublicUser, ApiError> {
    let upload = upload.ok_or_else(|| ApiError::validation("Cover image file is missing"))?;
    let url = relay_upload(st.media.as_ref(), Some(upload))
        .await
        .ok_or_else(|| ApiError::Upload("Error while uploading cover image".into()))?;

    let updated = st
        .users
        .set_cover_image(user.id, &url)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, "cover image updated");
    Ok(updated.into())
}
