use std::sync::Arc;

use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    get, post, web, HttpResponse,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ApiError;
use crate::middleware::auth::{AuthenticatedUser, SESSION_COOKIE};
use crate::models::User;
use crate::types::{AuthStatusResponse, CredentialsRequest, StatusResponse};
use crate::{AppConfig, AppState};

const MAX_USERNAME_CHARS: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: usize,
    pub iat: usize,
}

#[utoipa::path(
    post,
    path = "/api/register",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, body = StatusResponse),
        (status = 400, body = StatusResponse, description = "Missing username or password"),
        (status = 409, body = StatusResponse, description = "Username already exists"),
    )
)]
#[post("/register")]
pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    web::Json(credentials): web::Json<CredentialsRequest>,
) -> Result<web::Json<StatusResponse>, ApiError> {
    let username = credentials.username.trim();

    if username.is_empty() || credentials.password.is_empty() {
        return Err(ApiError::Validation(
            "Username and password are required".to_string(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::Validation(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_CHARS
        )));
    }

    if User::get_by_username(&app_state.pool, username).await?.is_some() {
        return Err(ApiError::DuplicateUsername);
    }

    let user = User::create(&app_state.pool, username, &credentials.password)
        .await
        .map_err(|e| match e.downcast_ref::<sqlx::Error>() {
            // Lost a race with a concurrent registration of the same name
            Some(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                ApiError::DuplicateUsername
            }
            _ => {
                error!("Failed to create user: {:?}", e);
                ApiError::Internal(e)
            }
        })?;

    info!("Registered user {} ({})", user.username, user.id);
    Ok(web::Json(StatusResponse::ok_with("Registration successful")))
}

#[utoipa::path(
    post,
    path = "/api/login",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, body = StatusResponse, description = "Sets the session cookie"),
        (status = 401, body = StatusResponse, description = "Invalid username or password"),
    )
)]
#[post("/login")]
pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    app_config: web::Data<Arc<AppConfig>>,
    web::Json(credentials): web::Json<CredentialsRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = User::get_by_username(&app_state.pool, credentials.username.trim())
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or(ApiError::InvalidCredentials)?;

    let token = sign_jwt(&user, &app_config).map_err(|e| {
        error!("Failed to sign session token: {:?}", e);
        ApiError::Internal(e.into())
    })?;

    info!("User {} logged in", user.username);
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(token, &app_config))
        .json(StatusResponse::ok()))
}

#[utoipa::path(post, path = "/api/logout", tag = "auth", responses((status = 200, body = StatusResponse)))]
#[post("/logout")]
pub async fn logout(app_config: web::Data<Arc<AppConfig>>) -> HttpResponse {
    let mut cookie = session_cookie(String::new(), &app_config);
    cookie.make_removal();

    HttpResponse::Ok().cookie(cookie).json(StatusResponse::ok())
}

#[utoipa::path(get, path = "/api/check_auth", tag = "auth", responses((status = 200, body = AuthStatusResponse)))]
#[get("/check_auth")]
pub async fn check_auth(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: Option<AuthenticatedUser>,
) -> Result<web::Json<AuthStatusResponse>, ApiError> {
    let user = match authenticated_user {
        Some(authenticated_user) => User::get_by_id(&app_state.pool, authenticated_user.user_id).await?,
        None => None,
    };

    Ok(web::Json(AuthStatusResponse {
        is_logged_in: user.is_some(),
        username: user.map(|user| user.username),
    }))
}

fn sign_jwt(user: &User, app_config: &AppConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        exp: now + app_config.session_ttl.as_secs() as usize,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(app_config.jwt_secret.as_ref()),
    )
}

fn session_cookie(value: String, app_config: &AppConfig) -> Cookie<'static> {
    // Cross-origin frontends only send the cookie back when it is SameSite=None, which browsers
    // accept only together with Secure.
    let same_site = if app_config.cookie_secure {
        SameSite::None
    } else {
        SameSite::Lax
    };

    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .secure(app_config.cookie_secure)
        .same_site(same_site)
        .max_age(CookieDuration::seconds(app_config.session_ttl.as_secs() as i64))
        .finish()
}
