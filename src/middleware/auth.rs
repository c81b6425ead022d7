// ==================== SESSION AUTH MIDDLEWARE ====================
// Verifies the identity provider's session token (Bearer JWT) and exposes
// the subject id plus profile claims to handlers via request extensions.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::utils::error::AppError;

/// Session claims mirrored from the identity provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // external subject id
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub exp: usize,
}

fn session_secret() -> Result<String, AppError> {
    std::env::var("SESSION_JWT_SECRET")
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::ConfigError("SESSION_JWT_SECRET is not set".to_string()))
}

pub fn verify_session_token(token: &str) -> Result<Claims, AppError> {
    let secret = session_secret()?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid session token: {}", e)))
}

/// Pulls the verified identity a middleware stored on the request
pub fn current_identity(req: &HttpRequest) -> Result<Claims, AppError> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
}

pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
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
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.to_string());

        let token = match token {
            Some(token) => token,
            None => {
                return Box::pin(async move {
                    Err(AppError::Unauthorized("Missing authorization token".to_string()).into())
                })
            }
        };

        match verify_session_token(&token) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res)
                })
            }
            Err(e) => {
                log::warn!("🚫 Session verification failed: {}", e);
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: "user_2abc".to_string(),
            email: "a@b.com".to_string(),
            name: Some("Ada".to_string()),
            image: None,
            email_verified: true,
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_roundtrip() {
        std::env::set_var("SESSION_JWT_SECRET", "test-session-secret");
        let token = make_token("test-session-secret", 3600);
        let claims = verify_session_token(&token).expect("valid token");
        assert_eq!(claims.sub, "user_2abc");
        assert!(claims.email_verified);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        std::env::set_var("SESSION_JWT_SECRET", "test-session-secret");
        let token = make_token("other-secret", 3600);
        assert!(matches!(
            verify_session_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        std::env::set_var("SESSION_JWT_SECRET", "test-session-secret");
        let token = make_token("test-session-secret", -3600);
        assert!(matches!(
            verify_session_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }
}
