use crate::errors::ShipmentEngineError;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::rc::Rc;
use uuid::Uuid;

/// Paths served without a bearer token. The acceptor confirming delivery
/// and the gateway redirect have no account.
const PUBLIC_PREFIXES: &[&str] = &[
    "/shipments/track/",
    "/shipments/confirm/",
    "/payments/verify/",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

fn is_public(path: &str) -> bool {
    path == "/health" || path == "/metrics" || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

pub struct JwtAuth {
    secret: String,
}

impl JwtAuth {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    secret: String,
}

fn reject(reason: &str) -> Error {
    ShipmentEngineError::Unauthorized(reason.to_string()).into()
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_public(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        }

        // Extract token from Authorization header
        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
        {
            Some(value) => match value.strip_prefix("Bearer ") {
                Some(token) => token.to_string(),
                None => {
                    return Box::pin(async { Err(reject("Authorization token malformed")) });
                }
            },
            None => {
                return Box::pin(async { Err(reject("Authorization token missing")) });
            }
        };

        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(
            &token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => {
                req.extensions_mut().insert(token_data.claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(err) => {
                tracing::warn!(error = ?err, "JWT validation failed");
                Box::pin(async { Err(reject("Invalid or expired token")) })
            }
        }
    }
}

/// Authenticated caller, taken from the claims the middleware stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
}

impl FromRequest for Caller {
    type Error = ShipmentEngineError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let caller = req
            .extensions()
            .get::<Claims>()
            .ok_or_else(|| ShipmentEngineError::Unauthorized("no authenticated user".to_string()))
            .and_then(|claims| {
                Uuid::parse_str(&claims.sub).map_err(|_| {
                    ShipmentEngineError::Unauthorized("token subject is not a user id".to_string())
                })
            })
            .map(|user_id| Caller { user_id });
        ready(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public("/health"));
        assert!(is_public("/metrics"));
        assert!(is_public("/shipments/track/SHIP-0000000001"));
        assert!(is_public("/shipments/confirm/SHIP-0000000001"));
        assert!(is_public("/payments/verify/ref-1"));
        assert!(!is_public("/shipments"));
        assert!(!is_public("/payments/initialize"));
        assert!(!is_public("/points/me"));
    }
}
