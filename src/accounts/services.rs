//! Account operations. Handlers stay thin; everything that validates,
//! authorizes, or touches the store lives here.

use axum::extract::FromRef;
use bytes::Bytes;
use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    accounts::{
        dto::{Pagination, PasswordChangeRequest, RegisterRequest, UpdateProfileRequest},
        model::{Account, Gender, Language, NewAccount, ProfileChanges, Role},
        validation::{
            check_email, check_max_len, check_optional_max_len, check_username, check_website,
            normalize_optional, ADDRESS_MAX, BIO_MAX, BUSINESS_MAX, CITY_MAX, COUNTRY_MAX,
            NAME_MAX, NATIONALITY_MAX, PHONE_MAX, POSTAL_CODE_MAX, REQUIRED, STATE_MAX,
        },
    },
    auth::{
        password::{burn_verification, hash_password, verify_password},
        AuthUser, JwtKeys, TokenPair,
    },
    error::{AppError, FieldErrors},
    state::AppState,
    storage::profile_picture_key,
};

const MAX_PAGE: i64 = 100;

/// Picture bytes pulled out of a multipart body.
pub struct PictureUpload {
    pub body: Bytes,
    pub content_type: String,
}

/// Loads the account behind a bearer token. Tokens outlive deleted accounts,
/// so a missing row is an authentication failure.
pub async fn load_principal(state: &AppState, AuthUser(id): AuthUser) -> Result<Account, AppError> {
    state.accounts.find_by_id(id).await?.ok_or_else(|| {
        warn!(account_id = %id, "token for missing account");
        AppError::Unauthenticated("Account not found".into())
    })
}

#[instrument(skip(state, req), fields(username = %req.username))]
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
) -> Result<(Account, TokenPair), AppError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    let mut errors = FieldErrors::new();
    check_username(&mut errors, &username);
    check_email(&mut errors, &email);
    if req.password.is_empty() {
        errors.add("password", REQUIRED);
    }
    if req.password2.is_empty() {
        errors.add("password2", REQUIRED);
    }
    if !req.password.is_empty() && !req.password2.is_empty() && req.password != req.password2 {
        errors.add("password", "Passwords do not match");
    }

    let role = match req.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        None => Role::Tourist,
        Some(raw) => match raw.parse::<Role>() {
            Ok(Role::Admin) => {
                errors.add("role", "Administrator accounts cannot be self-registered.");
                Role::Tourist
            }
            Ok(role) => role,
            Err(e) => {
                errors.add("role", e.to_string());
                Role::Tourist
            }
        },
    };

    let first_name = req.first_name.unwrap_or_default().trim().to_string();
    let last_name = req.last_name.unwrap_or_default().trim().to_string();
    let phone_number = normalize_optional(req.phone_number);
    check_max_len(&mut errors, "first_name", &first_name, NAME_MAX);
    check_max_len(&mut errors, "last_name", &last_name, NAME_MAX);
    check_optional_max_len(&mut errors, "phone_number", phone_number.as_deref(), PHONE_MAX);

    if !errors.is_empty() {
        warn!(?errors, "registration rejected");
        return Err(AppError::Validation(errors));
    }

    let password_hash = hash_password(&req.password)?;

    // The unique constraints decide duplicates; a conflict here becomes a field error.
    let account = state
        .accounts
        .create(NewAccount {
            username,
            email,
            password_hash,
            first_name,
            last_name,
            role,
            phone_number,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "create account failed");
            AppError::from(e)
        })?;

    let tokens = JwtKeys::from_ref(state).issue_pair(account.id)?;
    info!(account_id = %account.id, role = ?account.role, "account registered");
    Ok((account, tokens))
}

#[instrument(skip(state, password))]
pub async fn authenticate(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<(Account, TokenPair), AppError> {
    let username = username.trim();

    let Some(mut account) = state.accounts.find_by_username(username).await? else {
        burn_verification(password);
        warn!("login unknown username");
        return Err(AppError::invalid_credentials());
    };

    if !verify_password(password, &account.password_hash)? {
        warn!(account_id = %account.id, "login invalid password");
        return Err(AppError::invalid_credentials());
    }

    state.accounts.touch_last_login(account.id).await?;
    account.last_login_at = Some(OffsetDateTime::now_utc());

    let tokens = JwtKeys::from_ref(state).issue_pair(account.id)?;
    info!(account_id = %account.id, "account logged in");
    Ok((account, tokens))
}

/// Exchanges a refresh token for a fresh access token.
#[instrument(skip_all)]
pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<String, AppError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_refresh(refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthenticated("Token is invalid or expired".into())
    })?;

    if state.accounts.find_by_id(claims.sub).await?.is_none() {
        warn!(account_id = %claims.sub, "refresh for missing account");
        return Err(AppError::Unauthenticated("Token is invalid or expired".into()));
    }

    Ok(keys.sign_access(claims.sub)?)
}

pub async fn get_own_profile(state: &AppState, principal: AuthUser) -> Result<Account, AppError> {
    load_principal(state, principal).await
}

#[instrument(skip(state, req), fields(account_id = %principal.0))]
pub async fn update_own_profile(
    state: &AppState,
    principal: AuthUser,
    req: UpdateProfileRequest,
) -> Result<Account, AppError> {
    let account = load_principal(state, principal).await?;
    let changes = profile_changes(req)?;

    let updated = state
        .accounts
        .update_profile(account.id, &changes)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Account not found".into()))?;
    info!("profile updated");
    Ok(updated)
}

fn patch_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<Option<String>>,
    max: usize,
) -> Option<Option<String>> {
    value.map(|v| {
        let v = normalize_optional(v);
        check_optional_max_len(errors, field, v.as_deref(), max);
        v
    })
}

fn patch_name(errors: &mut FieldErrors, field: &str, value: Option<Option<String>>) -> Option<String> {
    value.map(|v| {
        let v = v.unwrap_or_default().trim().to_string();
        check_max_len(errors, field, &v, NAME_MAX);
        v
    })
}

/// Validates the keys present in `req`. Absent keys stay out of the
/// changes; `null` clears optional fields.
pub fn profile_changes(req: UpdateProfileRequest) -> Result<ProfileChanges, AppError> {
    let mut errors = FieldErrors::new();
    let e = &mut errors;

    let mut changes = ProfileChanges {
        first_name: patch_name(e, "first_name", req.first_name),
        last_name: patch_name(e, "last_name", req.last_name),
        phone_number: patch_text(e, "phone_number", req.phone_number, PHONE_MAX),
        nationality: patch_text(e, "nationality", req.nationality, NATIONALITY_MAX),
        address: patch_text(e, "address", req.address, ADDRESS_MAX),
        city: patch_text(e, "city", req.city, CITY_MAX),
        state: patch_text(e, "state", req.state, STATE_MAX),
        postal_code: patch_text(e, "postal_code", req.postal_code, POSTAL_CODE_MAX),
        country: patch_text(e, "country", req.country, COUNTRY_MAX),
        bio: patch_text(e, "bio", req.bio, BIO_MAX),
        business_name: patch_text(e, "business_name", req.business_name, BUSINESS_MAX),
        business_license: patch_text(e, "business_license", req.business_license, BUSINESS_MAX),
        receive_notifications: req.receive_notifications,
        receive_sms: req.receive_sms,
        ..Default::default()
    };

    if let Some(website) = req.website {
        let website = normalize_optional(website);
        check_website(&mut errors, website.as_deref());
        changes.website = Some(website);
    }

    if let Some(gender) = req.gender {
        match normalize_optional(gender).map(|g| g.parse::<Gender>()) {
            None => changes.gender = Some(None),
            Some(Ok(g)) => changes.gender = Some(Some(g)),
            Some(Err(err)) => errors.add("gender", err.to_string()),
        }
    }

    if let Some(dob) = req.date_of_birth {
        let format = format_description!("[year]-[month]-[day]");
        match normalize_optional(dob).map(|d| Date::parse(&d, format)) {
            None => changes.date_of_birth = Some(None),
            Some(Ok(d)) => changes.date_of_birth = Some(Some(d)),
            Some(Err(_)) => errors.add(
                "date_of_birth",
                "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
            ),
        }
    }

    if let Some(lang) = req.language_preference {
        match lang.trim().parse::<Language>() {
            Ok(l) => changes.language_preference = Some(l),
            Err(err) => errors.add("language_preference", err.to_string()),
        }
    }

    errors.into_result().map(|()| changes)
}

#[instrument(skip(state, req), fields(account_id = %principal.0))]
pub async fn change_password(
    state: &AppState,
    principal: AuthUser,
    req: PasswordChangeRequest,
) -> Result<(), AppError> {
    let account = load_principal(state, principal).await?;

    let mut errors = FieldErrors::new();
    for (field, value) in [
        ("old_password", &req.old_password),
        ("new_password", &req.new_password),
        ("new_password2", &req.new_password2),
    ] {
        if value.is_empty() {
            errors.add(field, REQUIRED);
        }
    }
    if !req.old_password.is_empty() && !verify_password(&req.old_password, &account.password_hash)? {
        errors.add("old_password", "Old password is incorrect");
    }
    if !req.new_password.is_empty()
        && !req.new_password2.is_empty()
        && req.new_password != req.new_password2
    {
        errors.add("new_password", "New passwords do not match");
    }
    if !errors.is_empty() {
        warn!(?errors, "password change rejected");
        return Err(AppError::Validation(errors));
    }

    let hash = hash_password(&req.new_password)?;
    if !state.accounts.set_password_hash(account.id, &hash).await? {
        return Err(AppError::Unauthenticated("Account not found".into()));
    }
    info!("password changed");
    Ok(())
}

/// Stores a new profile picture and returns its public URL.
#[instrument(skip(state, upload), fields(account_id = %principal.0, bytes = upload.body.len()))]
pub async fn upload_profile_picture(
    state: &AppState,
    principal: AuthUser,
    upload: PictureUpload,
) -> Result<String, AppError> {
    let account = load_principal(state, principal).await?;
    if upload.body.is_empty() {
        return Err(AppError::field("profile_picture", "The submitted file is empty."));
    }

    let key = profile_picture_key(account.id, &upload.content_type);
    state
        .storage
        .store(&key, upload.body, &upload.content_type)
        .await?;

    if !state.accounts.set_profile_picture(account.id, Some(&key)).await? {
        if let Err(e) = state.storage.remove(&key).await {
            warn!(error = %e, %key, "orphaned picture cleanup failed");
        }
        return Err(AppError::Unauthenticated("Account not found".into()));
    }

    if let Some(old) = account.profile_picture.as_deref() {
        if let Err(e) = state.storage.remove(old).await {
            warn!(error = %e, key = %old, "previous picture cleanup failed");
        }
    }

    info!(%key, "profile picture stored");
    Ok(state.storage.url_for(&key))
}

/// Public provider lookup. Anything that is not a provider, including a
/// malformed id, reads as "not found".
#[instrument(skip(state))]
pub async fn get_public_provider_info(
    state: &AppState,
    user_id: Option<&str>,
) -> Result<Account, AppError> {
    let raw = user_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id parameter required".into()))?;

    let not_found = || AppError::NotFound("Provider not found".into());
    let id = Uuid::parse_str(raw).map_err(|_| not_found())?;
    state
        .accounts
        .find_by_id_and_role(id, Role::Provider)
        .await?
        .ok_or_else(not_found)
}

/// Owner or admin only; everyone else is refused before the target is looked up.
fn authorize_owner_or_admin(actor: &Account, target: Uuid, denial: &str) -> Result<(), AppError> {
    if actor.id == target || actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(denial.into()))
    }
}

#[instrument(skip(state), fields(actor = %principal.0))]
pub async fn delete_account(
    state: &AppState,
    principal: AuthUser,
    target: Uuid,
) -> Result<(), AppError> {
    let actor = load_principal(state, principal).await?;
    authorize_owner_or_admin(&actor, target, "You can only delete your own account")
        .inspect_err(|_| warn!(%target, "delete of foreign account refused"))?;

    let account = state
        .accounts
        .find_by_id(target)
        .await?
        .ok_or_else(|| AppError::NotFound("Not found.".into()))?;

    if !state.accounts.delete(account.id).await? {
        return Err(AppError::NotFound("Not found.".into()));
    }

    if let Some(key) = account.profile_picture.as_deref() {
        if let Err(e) = state.storage.remove(key).await {
            warn!(error = %e, %key, "picture cleanup after delete failed");
        }
    }

    info!(%target, by_admin = actor.id != target, "account deleted");
    Ok(())
}

pub async fn list_accounts(
    state: &AppState,
    principal: AuthUser,
    page: Pagination,
) -> Result<Vec<Account>, AppError> {
    let actor = load_principal(state, principal).await?;
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "You do not have permission to perform this action.".into(),
        ));
    }
    let limit = page.limit.clamp(1, MAX_PAGE);
    let offset = page.offset.max(0);
    Ok(state.accounts.list(limit, offset).await?)
}

pub async fn get_account(
    state: &AppState,
    principal: AuthUser,
    id: Uuid,
) -> Result<Account, AppError> {
    let actor = load_principal(state, principal).await?;
    authorize_owner_or_admin(
        &actor,
        id,
        "You do not have permission to perform this action.",
    )?;
    if actor.id == id {
        return Ok(actor);
    }
    state
        .accounts
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Not found.".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::repo::AccountStore;
    use crate::test_support::fake_state;

    fn candidate(username: &str, email: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            password2: confirm.into(),
            ..Default::default()
        }
    }

    fn field_errors(err: AppError) -> FieldErrors {
        match err {
            AppError::Validation(fields) => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_defaults_to_tourist_and_issues_tokens() {
        let (state, store, _) = fake_state();
        let (account, tokens) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .expect("register");

        assert_eq!(account.role, Role::Tourist);
        assert!(!account.email_verified && !account.phone_verified);
        assert!(!account.identity_verified && !account.license_verified);
        assert_ne!(account.password_hash, "Pw1!");
        assert_eq!(store.len(), 1);

        let keys = JwtKeys::from_ref(&state);
        assert_eq!(keys.verify(&tokens.access).unwrap().sub, account.id);
        assert_eq!(keys.verify_refresh(&tokens.refresh).unwrap().sub, account.id);
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let (state, _, _) = fake_state();
        let (created, _) = register(&state, candidate("ali", "Ali@X.com ", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        assert_eq!(created.email, "ali@x.com");

        let (account, tokens) = authenticate(&state, "ali", "Pw1!").await.expect("login");
        assert_eq!(account.id, created.id);
        assert!(account.last_login_at.is_some());
        assert!(!tokens.access.is_empty() && !tokens.refresh.is_empty());
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_field_errors() {
        let (state, store, _) = fake_state();
        register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();

        let err = register(&state, candidate("ali", "other@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap_err();
        let fields = field_errors(err);
        assert!(fields.contains("username"));
        assert!(!fields.contains("email"));

        let err = register(&state, candidate("other", "ALI@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap_err();
        assert!(field_errors(err).contains("email"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn register_rejects_mismatch_missing_fields_and_admin_role() {
        let (state, store, _) = fake_state();

        let err = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw2!"))
            .await
            .unwrap_err();
        assert_eq!(
            field_errors(err).get("password"),
            Some(&["Passwords do not match".to_string()][..])
        );

        let err = register(&state, candidate("ali", "", "Pw1!", "Pw1!")).await.unwrap_err();
        assert!(field_errors(err).contains("email"));

        let mut req = candidate("boss", "boss@x.com", "Pw1!", "Pw1!");
        req.role = Some("admin".into());
        assert!(field_errors(register(&state, req).await.unwrap_err()).contains("role"));

        let mut req = candidate("odd", "odd@x.com", "Pw1!", "Pw1!");
        req.role = Some("pharaoh".into());
        assert!(field_errors(register(&state, req).await.unwrap_err()).contains("role"));

        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn authenticate_failures_are_indistinguishable() {
        let (state, _, _) = fake_state();
        register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();

        let wrong_password = authenticate(&state, "ali", "nope").await.unwrap_err();
        let unknown_user = authenticate(&state, "ghost", "Pw1!").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert_eq!(wrong_password.status(), unknown_user.status());
    }

    #[tokio::test]
    async fn change_password_swaps_credentials() {
        let (state, _, _) = fake_state();
        let (account, _) = register(&state, candidate("ali", "ali@x.com", "OldPw1!", "OldPw1!"))
            .await
            .unwrap();
        let principal = AuthUser(account.id);

        let bad_old = PasswordChangeRequest {
            old_password: "wrong".into(),
            new_password: "NewPw2!".into(),
            new_password2: "NewPw2!".into(),
        };
        let err = change_password(&state, principal, bad_old).await.unwrap_err();
        assert!(field_errors(err).contains("old_password"));

        let mismatch = PasswordChangeRequest {
            old_password: "OldPw1!".into(),
            new_password: "NewPw2!".into(),
            new_password2: "NewPw3!".into(),
        };
        let err = change_password(&state, principal, mismatch).await.unwrap_err();
        assert!(field_errors(err).contains("new_password"));

        let ok = PasswordChangeRequest {
            old_password: "OldPw1!".into(),
            new_password: "NewPw2!".into(),
            new_password2: "NewPw2!".into(),
        };
        change_password(&state, principal, ok).await.expect("change password");

        assert!(authenticate(&state, "ali", "NewPw2!").await.is_ok());
        assert!(matches!(
            authenticate(&state, "ali", "OldPw1!").await,
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn partial_update_touches_only_given_fields() {
        let (state, _, _) = fake_state();
        let mut req = candidate("ali", "ali@x.com", "Pw1!", "Pw1!");
        req.first_name = Some("Ali".into());
        req.phone_number = Some("+201001234567".into());
        let (account, _) = register(&state, req).await.unwrap();
        let principal = AuthUser(account.id);

        let patch = UpdateProfileRequest {
            bio: Some(Some("X".into())),
            ..Default::default()
        };
        let updated = update_own_profile(&state, principal, patch).await.unwrap();
        assert_eq!(updated.bio.as_deref(), Some("X"));
        assert_eq!(updated.first_name, "Ali");
        assert_eq!(updated.phone_number.as_deref(), Some("+201001234567"));
        assert_eq!(updated.language_preference, Language::En);
        assert!(updated.receive_notifications);

        let again = update_own_profile(
            &state,
            principal,
            UpdateProfileRequest {
                bio: Some(Some("X".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(again.bio, updated.bio);
        assert_eq!(again.first_name, updated.first_name);
        assert_eq!(again.username, "ali");
        assert_eq!(again.role, Role::Tourist);
    }

    #[test]
    fn profile_changes_validate_and_clear() {
        let mut account = crate::test_support::sample_account("ali");
        account.city = Some("Cairo".into());

        let req: UpdateProfileRequest = serde_json::from_value(serde_json::json!({
            "city": null,
            "gender": "F",
            "date_of_birth": "1990-05-17",
            "language_preference": "ar",
            "receive_sms": true
        }))
        .unwrap();
        let changes = profile_changes(req).unwrap();
        assert!(changes.bio.is_none() && changes.first_name.is_none());
        changes.apply_to(&mut account);
        assert_eq!(account.city, None);
        assert_eq!(account.gender, Some(Gender::Female));
        assert_eq!(account.date_of_birth, Some(time::macros::date!(1990 - 05 - 17)));
        assert_eq!(account.language_preference, Language::Ar);
        assert!(account.receive_sms);

        let bad: UpdateProfileRequest = serde_json::from_value(serde_json::json!({
            "gender": "X",
            "date_of_birth": "17/05/1990",
            "website": "not a url",
            "language_preference": "xx",
            "bio": "b".repeat(BIO_MAX + 1)
        }))
        .unwrap();
        let fields = field_errors(profile_changes(bad).unwrap_err());
        for f in ["gender", "date_of_birth", "website", "language_preference", "bio"] {
            assert!(fields.contains(f), "missing error for {f}");
        }
    }

    #[tokio::test]
    async fn updates_from_the_same_snapshot_both_survive() {
        let (state, store, _) = fake_state();
        let (account, _) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        let principal = AuthUser(account.id);

        let bio = UpdateProfileRequest {
            bio: Some(Some("guide".into())),
            ..Default::default()
        };
        let city = UpdateProfileRequest {
            city: Some(Some("Luxor".into())),
            ..Default::default()
        };
        let (a, b) = tokio::join!(
            update_own_profile(&state, principal, bio),
            update_own_profile(&state, principal, city)
        );
        a.unwrap();
        b.unwrap();

        let stored = store.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.bio.as_deref(), Some("guide"));
        assert_eq!(stored.city.as_deref(), Some("Luxor"));

        let changes = ProfileChanges {
            country: Some(Some("Egypt".into())),
            ..Default::default()
        };
        let after = store.update_profile(account.id, &changes).await.unwrap().unwrap();
        assert_eq!(after.bio.as_deref(), Some("guide"));
        assert_eq!(after.country.as_deref(), Some("Egypt"));
    }

    #[tokio::test]
    async fn provider_lookup_hides_tourists() {
        let (state, _, _) = fake_state();
        let (tourist, _) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        let mut req = candidate("hotel_cairo", "hotel@x.com", "Pw1!", "Pw1!");
        req.role = Some("provider".into());
        let (provider, _) = register(&state, req).await.unwrap();

        let found = get_public_provider_info(&state, Some(&provider.id.to_string()))
            .await
            .unwrap();
        assert_eq!(found.id, provider.id);

        let as_tourist = get_public_provider_info(&state, Some(&tourist.id.to_string()))
            .await
            .unwrap_err();
        let missing = get_public_provider_info(&state, Some(&Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        let garbage = get_public_provider_info(&state, Some("123")).await.unwrap_err();
        assert_eq!(as_tourist.to_string(), missing.to_string());
        assert_eq!(garbage.to_string(), missing.to_string());
        assert!(matches!(as_tourist, AppError::NotFound(_)));

        assert!(matches!(
            get_public_provider_info(&state, None).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn delete_requires_owner_or_admin() {
        let (state, store, _) = fake_state();
        let (victim, _) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        let (intruder, _) = register(&state, candidate("eve", "eve@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        let (admin, _) = register(&state, candidate("ops", "ops@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        store.promote(admin.id, Role::Admin, false);

        let err = delete_account(&state, AuthUser(intruder.id), victim.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(store.find_by_id(victim.id).await.unwrap().is_some());

        delete_account(&state, AuthUser(victim.id), victim.id)
            .await
            .expect("owner delete");
        assert!(matches!(
            get_account(&state, AuthUser(admin.id), victim.id).await,
            Err(AppError::NotFound(_))
        ));

        delete_account(&state, AuthUser(admin.id), intruder.id)
            .await
            .expect("admin delete");
        assert!(store.find_by_id(intruder.id).await.unwrap().is_none());

        assert!(matches!(
            delete_account(&state, AuthUser(admin.id), Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_principal_is_unauthenticated() {
        let (state, _, _) = fake_state();
        let (account, tokens) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        delete_account(&state, AuthUser(account.id), account.id)
            .await
            .unwrap();

        assert!(matches!(
            get_own_profile(&state, AuthUser(account.id)).await,
            Err(AppError::Unauthenticated(_))
        ));
        assert!(matches!(
            refresh(&state, &tokens.refresh).await,
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn refresh_issues_access_only_from_refresh_tokens() {
        let (state, _, _) = fake_state();
        let (account, tokens) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();

        let access = refresh(&state, &tokens.refresh).await.expect("refresh");
        let claims = JwtKeys::from_ref(&state).verify(&access).unwrap();
        assert_eq!(claims.sub, account.id);

        assert!(refresh(&state, &tokens.access).await.is_err());
        assert!(refresh(&state, "garbage").await.is_err());
    }

    #[tokio::test]
    async fn upload_replaces_picture_and_removes_previous_object() {
        let (state, store, storage) = fake_state();
        let (account, _) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        let principal = AuthUser(account.id);

        let first = upload_profile_picture(
            &state,
            principal,
            PictureUpload {
                body: Bytes::from_static(b"\x89PNG...."),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap();
        assert!(first.starts_with(&format!("https://media.test/profiles/{}/", account.id)));
        assert!(first.ends_with(".png"));

        let second = upload_profile_picture(
            &state,
            principal,
            PictureUpload {
                body: Bytes::from_static(b"\xff\xd8\xff"),
                content_type: "image/jpeg".into(),
            },
        )
        .await
        .unwrap();
        assert_ne!(first, second);

        let stored = store.find_by_id(account.id).await.unwrap().unwrap();
        let key = stored.profile_picture.unwrap();
        assert!(second.ends_with(&key));
        assert_eq!(storage.puts.lock().unwrap().len(), 2);
        let deletes = storage.deletes.lock().unwrap();
        assert_eq!(deletes.len(), 1);
        assert!(first.ends_with(&deletes[0]));

        drop(deletes);
        let err = upload_profile_picture(
            &state,
            principal,
            PictureUpload {
                body: Bytes::new(),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(field_errors(err).contains("profile_picture"));
    }

    #[tokio::test]
    async fn listing_is_admin_only_and_clamped() {
        let (state, store, _) = fake_state();
        let (tourist, _) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        let (admin, _) = register(&state, candidate("ops", "ops@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        store.promote(admin.id, Role::Tourist, true);

        let denied = list_accounts(
            &state,
            AuthUser(tourist.id),
            Pagination { limit: 20, offset: 0 },
        )
        .await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let all = list_accounts(&state, AuthUser(admin.id), Pagination { limit: 0, offset: -5 })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, admin.id);
    }

    #[tokio::test]
    async fn get_account_is_owner_or_admin() {
        let (state, _, _) = fake_state();
        let (ali, _) = register(&state, candidate("ali", "ali@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();
        let (eve, _) = register(&state, candidate("eve", "eve@x.com", "Pw1!", "Pw1!"))
            .await
            .unwrap();

        assert_eq!(get_account(&state, AuthUser(ali.id), ali.id).await.unwrap().id, ali.id);
        assert!(matches!(
            get_account(&state, AuthUser(eve.id), ali.id).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
