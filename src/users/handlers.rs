use std::path::Path;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, patch, post},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::instrument;

use super::{
    dto::{
        ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RegisterForm,
        UpdateAccountRequest,
    },
    repo_types::PublicUser,
    services,
};
use crate::{
    auth::{
        cookies::{clear_session, set_session, REFRESH_COOKIE},
        extractors::CurrentUser,
        jwt::TokenPair,
    },
    error::ApiError,
    extract::{MultipartBody, Payload},
    media::MultipartForm,
    response::ApiResponse,
    state::AppState,
};

/// Ceiling for multipart image uploads.
const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/register",
            post(register).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .route("/current-user", get(current_user))
        .route("/change-password", post(change_password))
        .route("/update-account", patch(update_account))
        .route(
            "/avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route(
            "/cover-image",
            patch(update_cover_image).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
}

async fn read_form(state: &AppState, mp: Multipart, files: &[&str]) -> Result<MultipartForm, ApiError> {
    MultipartForm::read(mp, Path::new(&state.config.upload_dir), files).await
}

/// POST /register (multipart: avatar, coverImage?, fullName, email, username, password)
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    MultipartBody(mp): MultipartBody,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let mut form = read_form(&state, mp, &["avatar", "coverImage"]).await?;
    let input = RegisterForm {
        full_name: form.take_text("fullName"),
        email: form.take_text("email"),
        username: form.take_text("username"),
        password: form.take_text("password"),
        avatar: form.take_file("avatar"),
        cover_image: form.take_file("coverImage"),
    };
    let user = services::register(&state, input).await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

#[instrument(skip(state, jar, req))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Payload(req): Payload<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let (pair, user) = services::login(&state, req).await?;
    let jar = set_session(jar, &pair, state.config.cookie_secure);
    Ok((
        jar,
        ApiResponse::ok(
            LoginResponse {
                user,
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

#[instrument(skip(state, jar, body))]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Payload<RefreshRequest>>,
) -> Result<(CookieJar, ApiResponse<TokenPair>), ApiError> {
    let incoming = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| body.and_then(|Payload(b)| b.refresh_token));

    let pair = services::refresh(&state, incoming).await?;
    let jar = set_session(jar, &pair, state.config.cookie_secure);
    Ok((jar, ApiResponse::ok(pair, "Access token refreshed")))
}

#[instrument(skip(state, jar, user))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentUser(user): CurrentUser,
) -> Result<(CookieJar, ApiResponse<serde_json::Value>), ApiError> {
    services::logout(&state, &user).await?;
    let jar = clear_session(jar, state.config.cookie_secure);
    Ok((
        jar,
        ApiResponse::ok(serde_json::json!({}), "User logged out successfully"),
    ))
}

#[instrument(skip(user))]
pub async fn current_user(CurrentUser(user): CurrentUser) -> ApiResponse<PublicUser> {
    ApiResponse::ok(user.into(), "Current user fetched successfully")
}

#[instrument(skip(state, user, req))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Payload(req): Payload<ChangePasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    services::change_password(&state, &user, req).await?;
    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    ))
}

#[instrument(skip(state, user, req))]
pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Payload(req): Payload<UpdateAccountRequest>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let updated = services::update_account(&state, &user, req).await?;
    Ok(ApiResponse::ok(updated, "Account details updated successfully"))
}

#[instrument(skip(state, user, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    MultipartBody(mp): MultipartBody,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let mut form = read_form(&state, mp, &["avatar"]).await?;
    let updated = services::update_avatar(&state, &user, form.take_file("avatar")).await?;
    Ok(ApiResponse::ok(updated, "Avatar updated successfully"))
}

#[instrument(skip(state, user, mp))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    MultipartBody(mp): MultipartBody,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let mut form = read_form(&state, mp, &["coverImage"]).await?;
    let updated = services::update_cover_image(&state, &user, form.take_file("coverImage")).await?;
    Ok(ApiResponse::ok(updated, "Cover image updated successfully"))
}
