use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    accounts::{
        dto::{
            AccessResponse, AccountDetail, AccountSummary, LoginRequest, LoginResponse,
            MessageResponse, PageQuery, Pagination, PasswordChangeRequest, ProfilePictureResponse,
            ProfileUpdatedResponse, ProviderInfo, ProviderInfoQuery, RefreshRequest,
            RegisterRequest, RegisterResponse, UpdateProfileRequest, PICTURE_FIELD,
        },
        services::{self, PictureUpload},
    },
    auth::AuthUser,
    error::AppError,
    state::AppState,
};

pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts/register", post(register))
        .route("/accounts/login", post(login))
        .route("/accounts/token/refresh", post(refresh))
        .route("/accounts/provider_info", get(provider_info))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/me", get(me).put(update_me).patch(update_me))
        .route("/accounts/password_change", post(password_change))
        .route("/accounts/:id", get(get_account).delete(delete_account))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts/upload_profile_picture", post(upload_profile_picture))
        .layer(DefaultBodyLimit::max(MAX_PICTURE_BYTES))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let Json(payload) = payload?;
    let (account, tokens) = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: account.id,
            access: tokens.access,
            refresh: tokens.refresh,
            user: AccountDetail::new(&account, state.storage.as_ref()),
            message: "Registration successful!",
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    // A malformed body is still just a failed login.
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let (account, tokens) =
        services::authenticate(&state, &payload.username, &payload.password).await?;
    Ok(Json(LoginResponse {
        access: tokens.access,
        refresh: tokens.refresh,
        user: AccountDetail::new(&account, state.storage.as_ref()),
        message: "Login successful!",
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessResponse>, AppError> {
    let Json(payload) = payload?;
    let access = services::refresh(&state, &payload.refresh).await?;
    Ok(Json(AccessResponse { access }))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    principal: AuthUser,
) -> Result<Json<AccountDetail>, AppError> {
    let account = services::get_own_profile(&state, principal).await?;
    Ok(Json(AccountDetail::new(&account, state.storage.as_ref())))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    principal: AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ProfileUpdatedResponse>, AppError> {
    let Json(payload) = payload?;
    let account = services::update_own_profile(&state, principal, payload).await?;
    Ok(Json(ProfileUpdatedResponse {
        message: "Profile updated successfully!",
        user: AccountDetail::new(&account, state.storage.as_ref()),
    }))
}

#[instrument(skip(state, payload))]
pub async fn password_change(
    State(state): State<AppState>,
    principal: AuthUser,
    payload: Result<Json<PasswordChangeRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(payload) = payload?;
    services::change_password(&state, principal, payload).await?;
    Ok(Json(MessageResponse {
        message: "Password changed successfully!",
    }))
}

fn picture_read_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(limit = MAX_PICTURE_BYTES, "profile picture over size limit");
        return AppError::field(
            PICTURE_FIELD,
            format!(
                "File too large. The maximum size is {} MB.",
                MAX_PICTURE_BYTES / (1024 * 1024)
            ),
        );
    }
    warn!(error = %e, "multipart read failed");
    AppError::field(PICTURE_FIELD, e.body_text())
}

/// POST /accounts/upload_profile_picture (multipart, field `profile_picture`)
#[instrument(skip(state, mp))]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    principal: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProfilePictureResponse>, AppError> {
    let mut mp = mp?;
    let mut upload = None;
    while let Some(field) = mp.next_field().await.map_err(picture_read_error)? {
        if field.name() != Some(PICTURE_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field.bytes().await.map_err(picture_read_error)?;
        upload = Some(PictureUpload { body, content_type });
        break;
    }

    let upload = upload
        .ok_or_else(|| AppError::field(PICTURE_FIELD, "No file was submitted."))?;
    let url = services::upload_profile_picture(&state, principal, upload).await?;
    Ok(Json(ProfilePictureResponse {
        profile_picture: url,
        message: "Profile picture uploaded!",
    }))
}

#[instrument(skip(state))]
pub async fn provider_info(
    State(state): State<AppState>,
    query: Result<Query<ProviderInfoQuery>, QueryRejection>,
) -> Result<Json<ProviderInfo>, AppError> {
    let Query(q) = query?;
    let account = services::get_public_provider_info(&state, q.user_id.as_deref()).await?;
    Ok(Json(ProviderInfo::new(&account, state.storage.as_ref())))
}

#[instrument(skip(state))]
pub async fn list_accounts(
    State(state): State<AppState>,
    principal: AuthUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Vec<AccountSummary>>, AppError> {
    let Query(raw) = query?;
    let page = Pagination::try_from(raw)?;
    let accounts = services::list_accounts(&state, principal, page).await?;
    let items = accounts
        .iter()
        .map(|a| AccountSummary::new(a, state.storage.as_ref()))
        .collect();
    Ok(Json(items))
}

/// Malformed ids read the same as unknown ones.
fn account_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::NotFound("Not found.".into()))
}

#[instrument(skip(state))]
pub async fn get_account(
    State(state): State<AppState>,
    principal: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<AccountDetail>, AppError> {
    let account = services::get_account(&state, principal, account_id(path)?).await?;
    Ok(Json(AccountDetail::new(&account, state.storage.as_ref())))
}

#[instrument(skip(state))]
pub async fn delete_account(
    State(state): State<AppState>,
    principal: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    services::delete_account(&state, principal, account_id(path)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
