//! Account handlers: registration, tokens, password management and the
//! staff-only user administration endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use redb::Database;
use tracing::{info, warn};

use crate::auth::{self, AdminUser, CurrentUser, TokenKind, INVALID_TOKEN};
use crate::database::{AppState, StoreError};
use crate::error::{ApiError, ApiResult};
use crate::model::{
    AccessToken, AdminPasswordRequest, AdminUserCreateRequest, AdminUserResponse,
    AdminUserUpdateRequest, DetailResponse, NewUser, PasswordChangeRequest,
    PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse, RefreshRequest,
    RegisterRequest, TokenPair, TokenRequest, UserRecord, UserResponse,
};
use crate::store;
use crate::validation::{
    normalize_email, validate_email, validate_password, validate_username, ValidationErrors,
    PASSWORD_MISMATCH, REQUIRED,
};

pub const NO_ACTIVE_ACCOUNT: &str = "No active account found with the given credentials";
const DUPLICATE_USERNAME: &str = "A user with that username already exists.";
const DUPLICATE_EMAIL: &str = "A user with that email already exists.";

/// Maps a uniqueness conflict from the store onto the offending field.
fn conflict_errors(err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict("username") => ValidationErrors::field("username", DUPLICATE_USERNAME).into(),
        StoreError::Conflict("email") => ValidationErrors::field("email", DUPLICATE_EMAIL).into(),
        other => other.into(),
    }
}

fn check_password(errors: &mut ValidationErrors, field: &str, password: &str, username: &str, email: Option<&str>) {
    if password.is_empty() {
        errors.add(field, REQUIRED);
    } else if let Err(messages) = validate_password(password, username, email) {
        errors.extend(field, messages);
    }
}

fn check_identity(errors: &mut ValidationErrors, username: &str, email: Option<&str>) {
    if let Err(messages) = validate_username(username) {
        errors.extend("username", messages);
    }
    if let Some(email) = email {
        if let Err(messages) = validate_email(email) {
            errors.extend("email", messages);
        }
    }
}

/// Stores a new password hash and moves `password_changed_at`, which
/// invalidates outstanding reset tokens.
async fn store_password(db: &Database, mut user: UserRecord, password: &str) -> ApiResult<UserRecord> {
    user.password_hash = auth::hash_password(password).await?;
    user.password_changed_at = Utc::now();
    store::update_user(db, &user)?.ok_or(ApiError::NotFound)
}

/// Registers a new account
///
/// # Request Body
///
/// ```json
/// {
///   "username": "ash",
///   "email": "ash@example.com",
///   "password": "S3nh@Ultra!",
///   "password_confirm": "S3nh@Ultra!"
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - The new user
/// - **400 Bad Request** - Field errors (taken username, weak password, ...)
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let Json(payload) = payload?;
    let username = payload.username.trim().to_string();
    let email = normalize_email(payload.email);

    let mut errors = ValidationErrors::new();
    check_identity(&mut errors, &username, email.as_deref());
    if let Some(confirm) = payload.password_confirm.filter(|confirm| !confirm.is_empty()) {
        if confirm != payload.password {
            errors.add("password_confirm", PASSWORD_MISMATCH);
        }
    }
    check_password(&mut errors, "password", &payload.password, &username, email.as_deref());
    errors.into_result()?;

    let user = store::create_user(
        &state.db,
        NewUser {
            username,
            email,
            password_hash: auth::hash_password(&payload.password).await?,
            is_staff: false,
            is_superuser: false,
            is_active: true,
        },
    )
    .map_err(conflict_errors)?;

    info!(event = "user.register", user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Exchanges credentials for an access/refresh token pair
pub async fn obtain_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> ApiResult<Json<TokenPair>> {
    let Json(payload) = payload?;

    let user = match store::find_user_by_username(&state.db, &payload.username)?.filter(|user| user.is_active) {
        Some(user) => auth::verify_password(&user.password_hash, &payload.password)
            .await?
            .then_some(user),
        None => None,
    };
    let Some(user) = user else {
        warn!(event = "auth.login.failed", username = %payload.username, "invalid credentials");
        return Err(ApiError::Unauthorized(NO_ACTIVE_ACCOUNT.into()));
    };

    info!(event = "auth.login", user_id = user.id, "token pair issued");
    Ok(Json(auth::generate_token_pair(&state.config, user.id)?))
}

/// Exchanges a refresh token for a new access token
pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Json<AccessToken>> {
    let Json(payload) = payload?;

    let claims = auth::verify_token(&state.config, &payload.refresh, TokenKind::Refresh)
        .ok_or_else(|| ApiError::Unauthorized(INVALID_TOKEN.into()))?;
    let user = store::get_user(&state.db, claims.sub)?
        .filter(|user| user.is_active)
        .ok_or_else(|| ApiError::Unauthorized(INVALID_TOKEN.into()))?;

    Ok(Json(AccessToken {
        access: auth::generate_access_token(&state.config, user.id)?,
    }))
}

/// The authenticated user's profile
pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

/// Changes the caller's password after checking the current one
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<PasswordChangeRequest>, JsonRejection>,
) -> ApiResult<Json<DetailResponse>> {
    let Json(payload) = payload?;

    let mut errors = ValidationErrors::new();
    if !auth::verify_password(&user.password_hash, &payload.current_password).await? {
        errors.add("current_password", "Your current password is incorrect.");
    }
    if payload.new_password != payload.new_password_confirm {
        errors.add("new_password_confirm", PASSWORD_MISMATCH);
    }
    check_password(
        &mut errors,
        "new_password",
        &payload.new_password,
        &user.username,
        user.email.as_deref(),
    );
    errors.into_result()?;

    let user = store_password(&state.db, user, &payload.new_password).await?;
    info!(event = "user.password.change", user_id = user.id, "password changed");
    Ok(Json(DetailResponse::new("Password updated successfully.")))
}

/// Starts a password reset for the account owning `email`
///
/// The reset link is logged instead of e-mailed. Outside production mode
/// the response also carries `uid` and `token` so a client can complete
/// the flow directly.
pub async fn request_password_reset(
    State(state): State<AppState>,
    payload: Result<Json<PasswordResetRequest>, JsonRejection>,
) -> ApiResult<Json<PasswordResetResponse>> {
    let Json(payload) = payload?;
    let email = payload.email.trim();

    if email.is_empty() {
        return Err(ValidationErrors::field("email", REQUIRED).into());
    }
    if let Err(messages) = validate_email(email) {
        let mut errors = ValidationErrors::new();
        errors.extend("email", messages);
        return Err(errors.into());
    }

    let user = store::find_user_by_email(&state.db, email)?
        .ok_or_else(|| ValidationErrors::field("email", "No user found with this e-mail address."))?;

    let uid = auth::encode_uid(user.id);
    let token = auth::generate_reset_token(&state.config, &user)?;

    if state.config.production {
        info!(event = "password_reset.requested", user_id = user.id, "password reset requested");
    } else {
        let reset_url = format!("{}/password-reset/{}/{}/", state.config.frontend_url, uid, token);
        info!(
            event = "password_reset.requested",
            user_id = user.id,
            reset_url = %reset_url,
            "password reset requested"
        );
    }

    let detail = "Password reset e-mail sent successfully.".to_string();
    let response = if state.config.production {
        PasswordResetResponse { detail, uid: None, token: None }
    } else {
        PasswordResetResponse { detail, uid: Some(uid), token: Some(token) }
    };
    Ok(Json(response))
}

/// Completes a password reset with the `uid`/`token` pair
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    payload: Result<Json<PasswordResetConfirmRequest>, JsonRejection>,
) -> ApiResult<Json<DetailResponse>> {
    let Json(payload) = payload?;

    if payload.new_password != payload.new_password_confirm {
        return Err(ValidationErrors::field("new_password_confirm", PASSWORD_MISMATCH).into());
    }

    let user = match auth::decode_uid(&payload.uid) {
        Some(user_id) => store::get_user(&state.db, user_id)?,
        None => None,
    };
    let user = user.ok_or_else(|| ValidationErrors::field("uid", "Invalid UID."))?;

    if !auth::verify_reset_token(&state.config, &payload.token, &user) {
        return Err(ValidationErrors::field("token", "Invalid or expired token.").into());
    }

    let mut errors = ValidationErrors::new();
    check_password(
        &mut errors,
        "new_password",
        &payload.new_password,
        &user.username,
        user.email.as_deref(),
    );
    errors.into_result()?;

    let user = store_password(&state.db, user, &payload.new_password).await?;
    info!(event = "password_reset.completed", user_id = user.id, "password reset");
    Ok(Json(DetailResponse::new("Password reset successfully.")))
}

// Administration

pub async fn list_users(AdminUser(_): AdminUser, State(state): State<AppState>) -> ApiResult<Json<Vec<AdminUserResponse>>> {
    let users = store::list_users(&state.db)?;
    Ok(Json(users.iter().map(AdminUserResponse::from).collect()))
}

pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<AdminUserCreateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AdminUserResponse>)> {
    let Json(payload) = payload?;
    let username = payload.username.trim().to_string();
    let email = normalize_email(payload.email);

    let mut errors = ValidationErrors::new();
    check_identity(&mut errors, &username, email.as_deref());
    if let Some(confirm) = payload.password_confirm.filter(|confirm| !confirm.is_empty()) {
        if confirm != payload.password {
            errors.add("password_confirm", PASSWORD_MISMATCH);
        }
    }
    check_password(&mut errors, "password", &payload.password, &username, email.as_deref());
    errors.into_result()?;

    let user = store::create_user(
        &state.db,
        NewUser {
            username,
            email,
            password_hash: auth::hash_password(&payload.password).await?,
            is_staff: payload.is_staff,
            is_superuser: false,
            is_active: payload.is_active,
        },
    )
    .map_err(conflict_errors)?;

    info!(event = "admin.user.create", admin_id = admin.id, user_id = user.id, "user created");
    Ok((StatusCode::CREATED, Json(AdminUserResponse::from(&user))))
}

pub async fn get_user(
    AdminUser(_): AdminUser,
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> ApiResult<Json<AdminUserResponse>> {
    let user = store::get_user(&state.db, user_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(AdminUserResponse::from(&user)))
}

/// Updates a user; serves both PUT and PATCH since every field is optional
pub async fn update_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    payload: Result<Json<AdminUserUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<AdminUserResponse>> {
    let Json(payload) = payload?;
    let mut user = store::get_user(&state.db, user_id)?.ok_or(ApiError::NotFound)?;

    if let Some(username) = payload.username {
        user.username = username.trim().to_string();
    }
    if let Some(email) = payload.email {
        user.email = normalize_email(Some(email));
    }
    if let Some(is_staff) = payload.is_staff {
        user.is_staff = is_staff;
    }
    if let Some(is_active) = payload.is_active {
        user.is_active = is_active;
    }

    let mut errors = ValidationErrors::new();
    check_identity(&mut errors, &user.username, user.email.as_deref());
    if let Some(password) = payload.password.as_deref().filter(|password| !password.is_empty()) {
        check_password(&mut errors, "password", password, &user.username, user.email.as_deref());
    }
    errors.into_result()?;

    if let Some(password) = payload.password.as_deref().filter(|password| !password.is_empty()) {
        user.password_hash = auth::hash_password(password).await?;
        user.password_changed_at = Utc::now();
    }

    let user = store::update_user(&state.db, &user)
        .map_err(conflict_errors)?
        .ok_or(ApiError::NotFound)?;

    info!(event = "admin.user.update", admin_id = admin.id, user_id = user.id, "user updated");
    Ok(Json(AdminUserResponse::from(&user)))
}

/// Deletes a user together with their favorites and team
///
/// # Response
///
/// - **204 No Content** - Deleted
/// - **400 Bad Request** - Deleting yourself or the last superuser
/// - **404 Not Found** - No such user
pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> ApiResult<StatusCode> {
    let target = store::get_user(&state.db, user_id)?.ok_or(ApiError::NotFound)?;

    if target.id == admin.id {
        return Err(ApiError::BadRequest("You cannot delete your own account.".into()));
    }
    if target.is_superuser && store::count_superusers(&state.db)? <= 1 {
        return Err(ApiError::BadRequest("Cannot delete the last superuser.".into()));
    }

    if !store::delete_user(&state.db, target.id)? {
        return Err(ApiError::NotFound);
    }

    info!(event = "admin.user.delete", admin_id = admin.id, user_id = target.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Sets a new password for any user
pub async fn admin_reset_password(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    payload: Result<Json<AdminPasswordRequest>, JsonRejection>,
) -> ApiResult<Json<DetailResponse>> {
    let Json(payload) = payload?;
    let user = store::get_user(&state.db, user_id)?.ok_or(ApiError::NotFound)?;

    let mut errors = ValidationErrors::new();
    check_password(
        &mut errors,
        "new_password",
        &payload.new_password,
        &user.username,
        user.email.as_deref(),
    );
    errors.into_result()?;

    let user = store_password(&state.db, user, &payload.new_password).await?;
    info!(event = "admin.user.password_reset", admin_id = admin.id, user_id = user.id, "password reset by admin");
    Ok(Json(DetailResponse::new(format!(
        "Password for {} reset successfully.",
        user.username
    ))))
}

/// Creates the initial superuser if no account with `username` exists.
///
/// Returns `true` when an account was created.
pub async fn bootstrap_superuser(
    db: &Database,
    username: &str,
    email: Option<String>,
    password: &str,
) -> ApiResult<bool> {
    if store::find_user_by_username(db, username)?.is_some() {
        return Ok(false);
    }

    store::create_user(
        db,
        NewUser {
            username: username.trim().to_string(),
            email: normalize_email(email),
            password_hash: auth::hash_password(password).await?,
            is_staff: true,
            is_superuser: true,
            is_active: true,
        },
    )
    .map_err(conflict_errors)?;
    Ok(true)
}
