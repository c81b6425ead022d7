// ==================== RATE LIMIT MIDDLEWARE ====================
// Wraps a scope or route with the limiter registered for its route key.
// Exhaustion answers 429 with Retry-After populated from the window.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

use crate::utils::error::AppError;
use crate::utils::rate_limiter::RateLimiterRegistry;

/// Client IP resolution order: x-forwarded-for, x-real-ip, peer address
fn client_ip(req: &ServiceRequest) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .or_else(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        })
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct RateLimit {
    route: &'static str,
}

impl RateLimit {
    pub fn scoped(route: &'static str) -> Self {
        Self { route }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service,
            route: self.route,
        }))
    }
}

pub struct RateLimitService<S> {
    service: S,
    route: &'static str,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
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
        let registry = req.app_data::<web::Data<RateLimiterRegistry>>().cloned();

        if let Some(registry) = registry {
            let ip = client_ip(&req);
            let limiter = registry.limiter(self.route);
            if let Err(e) = limiter.consume(&ip) {
                log::warn!("🛑 Rate limit hit on {} by {}", self.route, ip);
                return Box::pin(async move { Err(e.into()) });
            }
        } else {
            log::error!("RateLimiterRegistry not registered, skipping limit check");
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res)
        })
    }
}
