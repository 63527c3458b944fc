//! Token issuer. Access and refresh tokens are HS256 JWTs that differ only
//! in lifetime and the `kind` claim.

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::JwtConfig, error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        let mut validation = Validation::default();
        validation.set_issuer(&[cfg.issuer.as_str()]);
        validation.set_audience(&[cfg.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            validation,
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn claims_for(&self, account_id: Uuid, kind: TokenKind) -> Claims {
        let issued = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        Claims {
            sub: account_id,
            iat: issued.unix_timestamp(),
            exp: (issued + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        }
    }

    fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        let token = encode(&Header::default(), claims, &self.encoding)?;
        debug!(account_id = %claims.sub, kind = ?claims.kind, exp = claims.exp, "token issued");
        Ok(token)
    }

    pub fn sign_access(&self, account_id: Uuid) -> anyhow::Result<String> {
        self.sign(&self.claims_for(account_id, TokenKind::Access))
    }

    pub fn sign_refresh(&self, account_id: Uuid) -> anyhow::Result<String> {
        self.sign(&self.claims_for(account_id, TokenKind::Refresh))
    }

    pub fn issue_pair(&self, account_id: Uuid) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access: self.sign_access(account_id)?,
            refresh: self.sign_refresh(account_id)?,
        })
    }

    /// Signature, expiry, issuer and audience are all checked.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => anyhow::anyhow!("token expired"),
                _ => anyhow::Error::new(e).context("token rejected"),
            })?
            .claims;
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        match self.verify(token)? {
            claims if claims.kind == TokenKind::Refresh => Ok(claims),
            _ => anyhow::bail!("not a refresh token"),
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthenticated("Authentication credentials were not provided".into())
        })?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AppError::Unauthenticated("Invalid Authorization header".into())),
    }
}

/// The account id carried by a valid access token. Whether the account
/// still exists is for the operation to decide.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = JwtKeys::from_ref(state).verify(token).map_err(|e| {
            warn!(error = %e, "bearer token rejected");
            AppError::Unauthenticated("Invalid or expired token".into())
        })?;
        if claims.kind != TokenKind::Access {
            return Err(AppError::Unauthenticated("Access token required".into()));
        }
        Ok(AuthUser(claims.sub))
    }
}
