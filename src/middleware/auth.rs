use std::{
    future::{ready, Ready},
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, DecodingKey, Validation};
use tracing::{debug, warn};

use crate::{error::ApiError, routes::auth::Claims, AppConfig};

pub const SESSION_COOKIE: &str = "session";

/// The caller identified by a valid session cookie.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(ApiError::Unauthorized),
        )
    }
}

pub struct Authentication {
    pub app_config: Arc<AppConfig>,
}

// Middleware factory is `Transform` trait
// `S` - type of the next service
// `B` - type of response's body
impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service,
            decoding_key: DecodingKey::from_secret(self.app_config.jwt_secret.as_bytes()),
        }))
    }
}

pub struct AuthenticationMiddleware<S> {
    service: S,
    decoding_key: DecodingKey,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Resolve the session cookie into an AuthenticatedUser; handlers decide whether one is required
        if let Some(cookie) = req.cookie(SESSION_COOKIE) {
            match decode::<Claims>(cookie.value(), &self.decoding_key, &Validation::default()) {
                Ok(token_data) => {
                    let claims = token_data.claims;
                    match claims.sub.parse::<i64>() {
                        Ok(user_id) => {
                            debug!("Authenticated user: {}", user_id);
                            req.extensions_mut().insert(AuthenticatedUser {
                                user_id,
                                username: claims.username,
                            });
                        }
                        Err(_) => warn!("Session token with malformed subject: {}", claims.sub),
                    }
                }
                Err(e) => {
                    warn!("Invalid session token: {:?}", e);
                }
            }
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            Ok(res)
        })
    }
}
