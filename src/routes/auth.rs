/**
 * Authentication Routes
 * Session-cookie auth with login, invite/verify, and password flows
 */
use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{User, ROLE_ADMIN, ROLE_OWNER};
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

// ============================================================================
// Configuration
// ============================================================================

/// Name of the session cookie carrying the signed token.
pub const SESSION_COOKIE: &str = "token";

/// Session and one-time-code lifetime.
const SESSION_TTL_HOURS: i64 = 24;
const CODE_TTL_HOURS: i64 = 24;

/// Fixed initial password for invited admins. Known-in-source by design:
/// invitees are expected to change it after verifying their email.
pub const DEFAULT_ADMIN_PASSWORD: &str = "Altiplano#Cafe1";

const MIN_PASSWORD_LEN: usize = 8;

/// Column list for returning full `User` rows.
const USER_COLUMNS: &str = "id, email, password_hash, name, role, is_verified, \
     verification_token, verification_token_expires_at, \
     reset_password_token, reset_password_expires_at, \
     last_login, invited_by, created_at, updated_at";

// ============================================================================
// Types
// ============================================================================

/// Signed session token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,  // User ID
    pub role: String, // User role
    pub exp: i64,     // Expiry timestamp
    pub iat: i64,     // Issued at timestamp
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InviteAdminRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PasswordRequest {
    pub password: String,
}

// ============================================================================
// Session helpers
// ============================================================================

/// Create a signed session token for a user.
pub fn create_session_token(
    secret: &str,
    user_id: &Uuid,
    role: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::hours(SESSION_TTL_HOURS);

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify and decode a session token.
pub fn verify_session_token(
    secret: &str,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Set-Cookie value carrying the session token. HTTP-only so scripts
/// never see it; SameSite=None + Secure because the admin UI is served
/// from a different origin.
fn session_cookie(token: &str) -> String {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(cookie::time::Duration::hours(SESSION_TTL_HOURS))
        .build()
        .to_string()
}

/// Set-Cookie value that expires the session cookie immediately.
fn clear_session_cookie() -> String {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(cookie::time::Duration::ZERO)
        .build()
        .to_string()
}

/// Extract and verify the session token from the request's Cookie header.
pub fn session_claims(state: &AppState, headers: &HeaderMap) -> Option<Claims> {
    let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for cookie in Cookie::split_parse(cookie_header.to_string()).flatten() {
        if cookie.name() == SESSION_COOKIE {
            return verify_session_token(&state.session_secret, cookie.value()).ok();
        }
    }
    None
}

/// Guard: a valid session cookie is required.
pub fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Claims, (StatusCode, Json<ErrorResponse>)> {
    session_claims(state, headers).ok_or((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Authentication required")),
    ))
}

/// Guard: a valid session cookie with the owner role is required.
fn require_owner(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Claims, (StatusCode, Json<ErrorResponse>)> {
    let claims = require_session(state, headers)?;
    if claims.role != ROLE_OWNER {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("Owner role required")),
        ));
    }
    Ok(claims)
}

/// Guard: store connectivity is required; its absence is 503.
pub fn require_db(state: &AppState) -> Result<&PgPool, (StatusCode, Json<ErrorResponse>)> {
    state.db.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    ))
}

/// 6-digit one-time code (100000-999999).
fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

/// Bcrypt is CPU-intensive; run it off the async executor.
async fn hash_password(password: String) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    match tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST)).await {
        Ok(Ok(h)) => Ok(h),
        Ok(Err(e)) => {
            tracing::error!("Failed to hash password: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to process password")),
            ))
        }
        Err(e) => {
            tracing::error!("spawn_blocking panic during hash: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to process password")),
            ))
        }
    }
}

fn db_error(context: &str, e: sqlx::Error) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!("Database error during {}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Database error")),
    )
}

/// The one response body for both unknown-email and wrong-password logins,
/// so the two cases are indistinguishable to the caller.
fn invalid_credentials() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(AuthResponse {
            success: false,
            user: None,
            error: Some("Invalid credentials".to_string()),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
/// Authenticate and set the session cookie.
pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> Response {
    if payload.email.is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Email and password are required")),
        )
            .into_response();
    }

    if !payload.email.contains('@') {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid email format")),
        )
            .into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let user = match sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
        USER_COLUMNS
    ))
    .bind(&payload.email)
    .fetch_optional(pool)
    .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("Login attempt for unknown user: {}", payload.email);
            return invalid_credentials();
        }
        Err(e) => return db_error("login", e).into_response(),
    };

    // Verify password off the async executor.
    let password = payload.password.clone();
    let password_hash = user.password_hash.clone();
    let password_ok =
        tokio::task::spawn_blocking(move || verify(&password, &password_hash).unwrap_or(false))
            .await
            .unwrap_or(false);
    if !password_ok {
        tracing::warn!("Failed login attempt for: {}", user.email);
        return invalid_credentials();
    }

    // Best-effort; a failed timestamp update must not fail the login.
    let _ = sqlx::query("UPDATE users SET last_login = now(), updated_at = now() WHERE id = $1")
        .bind(user.id)
        .execute(pool)
        .await;

    let token = match create_session_token(&state.session_secret, &user.id, &user.role) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to create session token: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to create session")),
            )
                .into_response();
        }
    };

    tracing::info!("Successful login for user: {}", user.email);

    (
        StatusCode::OK,
        [(SET_COOKIE, session_cookie(&token))],
        Json(AuthResponse {
            success: true,
            user: Some(user),
            error: None,
        }),
    )
        .into_response()
}

/// POST /api/auth/logout
/// Clears the session cookie. Always succeeds.
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(SET_COOKIE, clear_session_cookie())],
        Json(SuccessResponse::with_message("Logged out")),
    )
}

/// GET /api/auth/check-auth
/// Validate the session cookie and return the referenced user.
pub async fn check_auth(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let claims = match require_session(&state, &headers) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Invalid or expired session")),
            )
                .into_response();
        }
    };

    match sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(AuthResponse {
                success: true,
                user: Some(user),
                error: None,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid or expired session")),
        )
            .into_response(),
        Err(e) => db_error("check-auth", e).into_response(),
    }
}

/// POST /api/auth/users/invite-admin (owner only)
/// Creates a pending admin with the fixed default password and a 6-digit
/// verification code, emails the code, and issues a session cookie for the
/// invitee on this response (inherited design choice).
pub async fn invite_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InviteAdminRequest>,
) -> Response {
    let claims = match require_owner(&state, &headers) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    if !payload.email.contains('@') {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid email format")),
        )
            .into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, (bool,)>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
    )
    .bind(&payload.email)
    .fetch_one(pool)
    .await
    {
        Ok((true,)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Email already registered")),
            )
                .into_response();
        }
        Ok((false,)) => {}
        Err(e) => return db_error("invite-admin", e).into_response(),
    }

    let password_hash = match hash_password(DEFAULT_ADMIN_PASSWORD.to_string()).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    let invited_by = Uuid::parse_str(&claims.sub).ok();
    let code = generate_code();
    let expires_at: DateTime<Utc> = Utc::now() + Duration::hours(CODE_TTL_HOURS);

    let user = match sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users
            (email, password_hash, name, role, is_verified,
             verification_token, verification_token_expires_at, invited_by)
        VALUES ($1, $2, $3, $4, false, $5, $6, $7)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(payload.email.split('@').next().unwrap_or(""))
    .bind(ROLE_ADMIN)
    .bind(&code)
    .bind(expires_at)
    .bind(invited_by)
    .fetch_one(pool)
    .await
    {
        Ok(user) => user,
        Err(e) => return db_error("invite-admin insert", e).into_response(),
    };

    if let Err(e) = state.mailer.send_verification_code(&user.email, &code).await {
        tracing::error!("Failed to send verification email to {}: {}", user.email, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to send verification email")),
        )
            .into_response();
    }

    let invitee_token = match create_session_token(&state.session_secret, &user.id, &user.role) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to create session token for invitee: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to create session")),
            )
                .into_response();
        }
    };

    tracing::info!("Admin invited: {}", user.email);

    (
        StatusCode::CREATED,
        [(SET_COOKIE, session_cookie(&invitee_token))],
        Json(AuthResponse {
            success: true,
            user: Some(user),
            error: None,
        }),
    )
        .into_response()
}

/// POST /api/auth/verify-email
/// Exchange a pending 6-digit code for verified status. The code is
/// cleared on success so it cannot be replayed.
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Response {
    if payload.code.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Verification code is required")),
        )
            .into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    // Codes are only 6 digits, so a cross-account collision is possible;
    // the inner select pins the update to exactly one account.
    let user = match sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET is_verified = true,
            verification_token = NULL,
            verification_token_expires_at = NULL,
            updated_at = now()
        WHERE id = (
            SELECT id FROM users
            WHERE verification_token = $1
              AND verification_token_expires_at > now()
            ORDER BY created_at ASC
            LIMIT 1
        )
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(&payload.code)
    .fetch_optional(pool)
    .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid or expired verification code")),
            )
                .into_response();
        }
        Err(e) => return db_error("verify-email", e).into_response(),
    };

    // Verification is already committed; a failed welcome email is logged,
    // not surfaced.
    if let Err(e) = state.mailer.send_welcome(&user.email, &user.name).await {
        tracing::error!("Failed to send welcome email to {}: {}", user.email, e);
    }

    tracing::info!("Email verified for user: {}", user.email);

    (
        StatusCode::OK,
        Json(AuthResponse {
            success: true,
            user: Some(user),
            error: None,
        }),
    )
        .into_response()
}

/// POST /api/auth/forgot-password
/// Issues a fresh reset code (overwriting any previous one) and emails it.
/// Responds 200 whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Response {
    if !payload.email.contains('@') {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid email format")),
        )
            .into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let code = generate_code();
    let expires_at: DateTime<Utc> = Utc::now() + Duration::hours(CODE_TTL_HOURS);

    let target = match sqlx::query_as::<_, (Uuid, String)>(
        r#"
        UPDATE users
        SET reset_password_token = $1,
            reset_password_expires_at = $2,
            updated_at = now()
        WHERE LOWER(email) = LOWER($3)
        RETURNING id, email
        "#,
    )
    .bind(&code)
    .bind(expires_at)
    .bind(&payload.email)
    .fetch_optional(pool)
    .await
    {
        Ok(t) => t,
        Err(e) => return db_error("forgot-password", e).into_response(),
    };

    if let Some((_, email)) = target {
        if let Err(e) = state.mailer.send_reset_code(&email, &code).await {
            tracing::error!("Failed to send reset email to {}: {}", email, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to send reset email")),
            )
                .into_response();
        }
        tracing::info!("Password reset code issued for: {}", email);
    } else {
        tracing::warn!("Password reset requested for unknown email");
    }

    (
        StatusCode::OK,
        Json(SuccessResponse::with_message(
            "If that account exists, a reset code has been sent",
        )),
    )
        .into_response()
}

/// POST /api/auth/reset-password/{token}
/// Exchange a valid reset code for a new password.
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<PasswordRequest>,
) -> Response {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Password must be at least 8 characters long",
            )),
        )
            .into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let password_hash = match hash_password(payload.password).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    let email = match sqlx::query_as::<_, (String,)>(
        r#"
        UPDATE users
        SET password_hash = $1,
            reset_password_token = NULL,
            reset_password_expires_at = NULL,
            updated_at = now()
        WHERE reset_password_token = $2
          AND reset_password_expires_at > now()
        RETURNING email
        "#,
    )
    .bind(&password_hash)
    .bind(&token)
    .fetch_optional(pool)
    .await
    {
        Ok(Some((email,))) => email,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid or expired reset token")),
            )
                .into_response();
        }
        Err(e) => return db_error("reset-password", e).into_response(),
    };

    // Password is already updated; a failed confirmation email is logged,
    // not surfaced.
    if let Err(e) = state.mailer.send_reset_confirmation(&email).await {
        tracing::error!("Failed to send reset confirmation to {}: {}", email, e);
    }

    tracing::info!("Password reset completed for: {}", email);

    (
        StatusCode::OK,
        Json(SuccessResponse::with_message("Password updated")),
    )
        .into_response()
}

/// POST /api/auth/change-password
/// Overwrites the password of the authenticated user. Identity comes from
/// the session cookie, never from the request body.
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PasswordRequest>,
) -> Response {
    let claims = match require_session(&state, &headers) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    if payload.password.len() < MIN_PASSWORD_LEN {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Password must be at least 8 characters long",
            )),
        )
            .into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Invalid or expired session")),
            )
                .into_response();
        }
    };

    let password_hash = match hash_password(payload.password).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    match sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
        .bind(&password_hash)
        .bind(user_id)
        .execute(pool)
        .await
    {
        Ok(result) if result.rows_affected() == 0 => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid or expired session")),
        )
            .into_response(),
        Ok(_) => {
            tracing::info!("Password changed for user {}", user_id);
            (
                StatusCode::OK,
                Json(SuccessResponse::with_message("Password updated")),
            )
                .into_response()
        }
        Err(e) => db_error("change-password", e).into_response(),
    }
}

/// DELETE /api/auth/users/{id} (owner only)
/// Owners cannot be deleted, not even by another owner.
pub async fn delete_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = require_owner(&state, &headers) {
        return e.into_response();
    }

    let user_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid user id")),
            )
                .into_response();
        }
    };

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let (role, email) = match sqlx::query_as::<_, (String, String)>(
        "SELECT role, email FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("User not found")),
            )
                .into_response();
        }
        Err(e) => return db_error("delete-admin", e).into_response(),
    };

    if role == ROLE_OWNER {
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("Cannot delete an owner account")),
        )
            .into_response();
    }

    if let Err(e) = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
    {
        return db_error("delete-admin delete", e).into_response();
    }

    tracing::info!("Admin deleted: {}", email);

    (
        StatusCode::OK,
        Json(SuccessResponse::with_message(format!(
            "Deleted admin {}",
            email
        ))),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::{delete, get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::for_tests(&std::env::temp_dir())
    }

    fn auth_router(state: AppState) -> Router {
        Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/check-auth", get(check_auth))
            .route("/api/auth/users/invite-admin", post(invite_admin))
            .route("/api/auth/verify-email", post(verify_email))
            .route("/api/auth/forgot-password", post(forgot_password))
            .route("/api/auth/reset-password/{token}", post(reset_password))
            .route("/api/auth/change-password", post(change_password))
            .route("/api/auth/users/{id}", delete(delete_admin))
            .with_state(state)
    }

    fn session_header(state: &AppState, role: &str) -> String {
        let token = create_session_token(&state.session_secret, &Uuid::new_v4(), role).unwrap();
        format!("{}={}", SESSION_COOKIE, token)
    }

    async fn send(
        app: Router,
        req: Request<Body>,
    ) -> (StatusCode, axum::body::Bytes) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap();
        send(app, req).await
    }

    #[test]
    fn test_session_token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = create_session_token("secret", &user_id, ROLE_OWNER).unwrap();
        let claims = verify_session_token("secret", &token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, ROLE_OWNER);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_session_token_rejects_wrong_secret() {
        let token = create_session_token("secret-a", &Uuid::new_v4(), ROLE_ADMIN).unwrap();
        assert!(verify_session_token("secret-b", &token).is_err());
    }

    #[test]
    fn test_session_token_rejects_expired() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: ROLE_ADMIN.to_string(),
            exp: (Utc::now() - Duration::hours(2)).timestamp(),
            iat: (Utc::now() - Duration::hours(26)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(verify_session_token("secret", &token).is_err());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let value = session_cookie("abc");
        assert!(value.starts_with("token=abc"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Secure"));
        assert!(value.contains("SameSite=None"));
        assert!(value.contains("Max-Age=86400"));
    }

    #[test]
    fn test_generate_code_is_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_login_empty_fields_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(test_state()),
            "/api/auth/login",
            &LoginRequest {
                email: "".to_string(),
                password: "secret123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_invalid_email_format_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(test_state()),
            "/api/auth/login",
            &LoginRequest {
                email: "no-at-sign".to_string(),
                password: "secret123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_without_database_returns_service_unavailable() {
        let (status, _) = post_json(
            auth_router(test_state()),
            "/api/auth/login",
            &LoginRequest {
                email: "owner@example.com".to_string(),
                password: "secret123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_check_auth_without_cookie_returns_unauthorized() {
        let req = Request::get("/api/auth/check-auth")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(auth_router(test_state()), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_check_auth_with_garbage_cookie_returns_unauthorized() {
        let req = Request::get("/api/auth/check-auth")
            .header(header::COOKIE, "token=not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(auth_router(test_state()), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invite_admin_without_session_returns_unauthorized() {
        let (status, _) = post_json(
            auth_router(test_state()),
            "/api/auth/users/invite-admin",
            &InviteAdminRequest {
                email: "new@example.com".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invite_admin_as_admin_returns_forbidden() {
        let state = test_state();
        let cookie = session_header(&state, ROLE_ADMIN);
        let req = Request::post("/api/auth/users/invite-admin")
            .header("content-type", "application/json")
            .header(header::COOKIE, cookie)
            .body(Body::from(
                serde_json::to_vec(&InviteAdminRequest {
                    email: "new@example.com".to_string(),
                })
                .unwrap(),
            ))
            .unwrap();
        let (status, _) = send(auth_router(state), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_delete_admin_as_admin_returns_forbidden() {
        let state = test_state();
        let cookie = session_header(&state, ROLE_ADMIN);
        let req = Request::delete(format!("/api/auth/users/{}", Uuid::new_v4()))
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(auth_router(state), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_delete_admin_invalid_id_returns_bad_request() {
        let state = test_state();
        let cookie = session_header(&state, ROLE_OWNER);
        let req = Request::delete("/api/auth/users/not-a-uuid")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(auth_router(state), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_verify_email_empty_code_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(test_state()),
            "/api/auth/verify-email",
            &VerifyEmailRequest {
                code: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_password_short_password_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(test_state()),
            "/api/auth/reset-password/123456",
            &PasswordRequest {
                password: "short".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_change_password_without_session_returns_unauthorized() {
        let (status, _) = post_json(
            auth_router(test_state()),
            "/api/auth/change-password",
            &PasswordRequest {
                password: "longenough123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Needs DATABASE_URL; skips otherwise.
    #[tokio::test]
    async fn test_verify_email_flips_verified_and_rejects_replay() {
        let Some(pool) = crate::db::test_support::pool_from_env().await else {
            return;
        };
        let state = AppState::for_tests_with_db(pool.clone(), &std::env::temp_dir());
        let email = format!("verify-{}@example.com", Uuid::new_v4());
        let code = generate_code();

        sqlx::query(
            r#"
            INSERT INTO users
                (email, password_hash, name, role, is_verified,
                 verification_token, verification_token_expires_at)
            VALUES ($1, 'x', 'Pending Admin', 'admin', false,
                    $2, now() + interval '1 hour')
            "#,
        )
        .bind(&email)
        .bind(&code)
        .execute(&pool)
        .await
        .unwrap();

        let (status, _) = post_json(
            auth_router(state.clone()),
            "/api/auth/verify-email",
            &VerifyEmailRequest { code: code.clone() },
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (is_verified, token): (bool, Option<String>) = sqlx::query_as(
            "SELECT is_verified, verification_token FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(is_verified);
        assert!(token.is_none());

        // The code was cleared on use; replaying it fails.
        let (status, _) = post_json(
            auth_router(state),
            "/api/auth/verify-email",
            &VerifyEmailRequest { code },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(&email)
            .execute(&pool)
            .await
            .unwrap();
    }

    // Needs DATABASE_URL; skips otherwise.
    #[tokio::test]
    async fn test_owner_cannot_delete_owner() {
        let Some(pool) = crate::db::test_support::pool_from_env().await else {
            return;
        };
        let state = AppState::for_tests_with_db(pool.clone(), &std::env::temp_dir());
        let email = format!("owner-{}@example.com", Uuid::new_v4());

        let (target_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash, name, role, is_verified)
            VALUES ($1, 'x', 'Second Owner', 'owner', true)
            RETURNING id
            "#,
        )
        .bind(&email)
        .fetch_one(&pool)
        .await
        .unwrap();

        let cookie = session_header(&state, ROLE_OWNER);
        let req = Request::delete(format!("/api/auth/users/{}", target_id))
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(auth_router(state), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // The record survives the attempt.
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = $1")
            .bind(target_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(target_id)
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let req = Request::post("/api/auth/logout")
            .body(Body::empty())
            .unwrap();
        let res = auth_router(test_state()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("token="));
        assert!(set_cookie.contains("Max-Age=0"));
    }
}
