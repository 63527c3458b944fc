//! Wire types. Each response view is shaped by its own constructor so the
//! field set an operation exposes is fixed at the call site.

use serde::{Deserialize, Deserializer, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::accounts::model::{Account, Gender, Language, Role};
use crate::error::{AppError, FieldErrors};
use crate::storage::MediaStore;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Distinguishes an absent key (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---- requests ----

/// Request body for account registration.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "password_confirm")]
    pub password2: String,
    #[serde(default, alias = "user_type")]
    pub role: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PasswordChangeRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default, alias = "new_password_confirm")]
    pub new_password2: String,
}

/// Partial profile update. Keys that are not listed here (username, email,
/// role, verification flags, timestamps) are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub date_of_birth: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub nationality: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub state: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub postal_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub country: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub website: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub business_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub business_license: Option<Option<String>>,
    #[serde(default)]
    pub language_preference: Option<String>,
    #[serde(default)]
    pub receive_notifications: Option<bool>,
    #[serde(default)]
    pub receive_sms: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderInfoQuery {
    pub user_id: Option<String>,
}

/// Multipart field carrying the profile picture.
pub const PICTURE_FIELD: &str = "profile_picture";

/// Raw `limit`/`offset` query values; parsed by [`Pagination::try_from`] so
/// a bad number is reported against its own key.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

const DEFAULT_LIMIT: i64 = 20;

fn page_param(errors: &mut FieldErrors, field: &str, raw: Option<&str>, default: i64) -> i64 {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            errors.add(field, "A valid integer is required.");
            default
        }),
    }
}

impl TryFrom<PageQuery> for Pagination {
    type Error = AppError;

    fn try_from(q: PageQuery) -> Result<Self, AppError> {
        let mut errors = FieldErrors::new();
        let limit = page_param(&mut errors, "limit", q.limit.as_deref(), DEFAULT_LIMIT);
        let offset = page_param(&mut errors, "offset", q.offset.as_deref(), 0);
        errors.into_result().map(|()| Pagination { limit, offset })
    }
}

// ---- responses ----

/// Complete profile, returned to the owner (and admins).
#[derive(Debug, Serialize)]
pub struct AccountDetail {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub gender: Option<Gender>,
    #[serde(with = "iso_date::option")]
    pub date_of_birth: Option<Date>,
    pub nationality: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub identity_verified: bool,
    pub license_verified: bool,
    pub business_name: Option<String>,
    pub business_license: Option<String>,
    pub language_preference: Language,
    pub receive_notifications: bool,
    pub receive_sms: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
}

impl AccountDetail {
    pub fn new(a: &Account, storage: &dyn MediaStore) -> Self {
        Self {
            id: a.id,
            username: a.username.clone(),
            email: a.email.clone(),
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            full_name: a.full_name(),
            phone_number: a.phone_number.clone(),
            gender: a.gender,
            date_of_birth: a.date_of_birth,
            nationality: a.nationality.clone(),
            address: a.address.clone(),
            city: a.city.clone(),
            state: a.state.clone(),
            postal_code: a.postal_code.clone(),
            country: a.country.clone(),
            profile_picture: picture_url(a, storage),
            bio: a.bio.clone(),
            website: a.website.clone(),
            role: a.role,
            email_verified: a.email_verified,
            phone_verified: a.phone_verified,
            identity_verified: a.identity_verified,
            license_verified: a.license_verified,
            business_name: a.business_name.clone(),
            business_license: a.business_license.clone(),
            language_preference: a.language_preference,
            receive_notifications: a.receive_notifications,
            receive_sms: a.receive_sms,
            created_at: a.created_at,
            updated_at: a.updated_at,
            last_login_at: a.last_login_at,
        }
    }
}

/// Row in the admin account listing.
#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub email_verified: bool,
    pub profile_picture: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AccountSummary {
    pub fn new(a: &Account, storage: &dyn MediaStore) -> Self {
        Self {
            id: a.id,
            username: a.username.clone(),
            email: a.email.clone(),
            full_name: a.full_name(),
            role: a.role,
            email_verified: a.email_verified,
            profile_picture: picture_url(a, storage),
            created_at: a.created_at,
        }
    }
}

/// Public provider card. Contact and address fields are never included.
#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub business_name: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub identity_verified: bool,
    pub license_verified: bool,
}

impl ProviderInfo {
    pub fn new(a: &Account, storage: &dyn MediaStore) -> Self {
        Self {
            id: a.id,
            username: a.username.clone(),
            full_name: a.full_name(),
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            profile_picture: picture_url(a, storage),
            bio: a.bio.clone(),
            website: a.website.clone(),
            business_name: a.business_name.clone(),
            email_verified: a.email_verified,
            phone_verified: a.phone_verified,
            identity_verified: a.identity_verified,
            license_verified: a.license_verified,
        }
    }
}

fn picture_url(a: &Account, storage: &dyn MediaStore) -> Option<String> {
    a.profile_picture.as_deref().map(|key| storage.url_for(key))
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub access: String,
    pub refresh: String,
    pub user: AccountDetail,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: AccountDetail,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub access: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdatedResponse {
    pub message: &'static str,
    pub user: AccountDetail,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ProfilePictureResponse {
    pub profile_picture: String,
    pub message: &'static str,
}
