//! Request-level error taxonomy and its HTTP mapping.
//!
//! Every failure a handler can return ends up as one of the variants below.
//! None of them are retried; infrastructure detail is logged and never echoed
//! to the caller.

use std::collections::BTreeMap;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{error, warn};

use crate::accounts::{dto::PICTURE_FIELD, repo::StoreError, validation::REQUIRED};

/// Field name -> list of messages, serialized the way clients already expect
/// (`{"username": ["..."]}`).
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was collected, otherwise a validation error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),
    /// Missing or bad credentials. The message is generic on purpose.
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_credentials() -> Self {
        Self::Unauthenticated("Invalid credentials".into())
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(fields) => json!(fields),
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => AppError::field(
                field.as_str(),
                format!("An account with this {} already exists.", field.as_str()),
            ),
            StoreError::Database(e) => AppError::Internal(anyhow::Error::new(e).context("account store")),
        }
    }
}

pub const NON_FIELD: &str = "non_field_errors";
const JSON_DATA_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

lazy_static! {
    static ref FIELD_PATH_RE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*): (.+)$").unwrap();
    static ref MISSING_FIELD_RE: Regex = Regex::new(r"^missing field `([A-Za-z0-9_]+)`").unwrap();
    static ref POSITION_RE: Regex = Regex::new(r" at line \d+ column \d+$").unwrap();
}

/// Keys a serde data error (`"<field>: <message>"`) by the offending field.
fn keyed_data_error(detail: &str) -> FieldErrors {
    let detail = POSITION_RE.replace(detail, "");
    if let Some(caps) = MISSING_FIELD_RE.captures(&detail) {
        return FieldErrors::single(&caps[1], REQUIRED);
    }
    match FIELD_PATH_RE.captures(&detail) {
        Some(caps) => FieldErrors::single(&caps[1], &caps[2]),
        None => FieldErrors::single(NON_FIELD, detail.to_string()),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let errors = match &rejection {
            JsonRejection::JsonDataError(e) => {
                let text = e.body_text();
                keyed_data_error(text.strip_prefix(JSON_DATA_PREFIX).unwrap_or(&text))
            }
            other => FieldErrors::single(NON_FIELD, other.body_text()),
        };
        warn!(?errors, "json body rejected");
        AppError::Validation(errors)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        warn!(error = %rejection.body_text(), "query string rejected");
        AppError::field(NON_FIELD, rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        warn!(error = %rejection.body_text(), "multipart body rejected");
        AppError::field(
            PICTURE_FIELD,
            "The submitted data was not a file. Check the encoding type on the form.",
        )
    }
}
