//! Admin token middleware.
//!
//! Every route under `/admin` is wrapped with this middleware. The caller must present one of the configured tokens in
//! the `X-Admin-Token` header. The token identifies the admin, and the resolved [`AdminId`] is stored in the request
//! extensions so handlers can attribute their actions (approvals, blocks, refunds) to the right person.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{
    config::AdminTokens,
    errors::{AuthError, ServerError},
};

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// The admin making the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminId(pub i64);

pub struct AdminAuthMiddlewareFactory {
    tokens: AdminTokens,
}

impl AdminAuthMiddlewareFactory {
    pub fn new(tokens: AdminTokens) -> Self {
        AdminAuthMiddlewareFactory { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AdminAuthMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminAuthMiddlewareService { tokens: self.tokens.clone(), service: Rc::new(service) }))
    }
}

pub struct AdminAuthMiddlewareService<S> {
    tokens: AdminTokens,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AdminAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let admin = req
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .ok_or(AuthError::MissingAdminToken)
            .and_then(|v| v.to_str().map_err(|_| AuthError::InvalidAdminToken))
            .and_then(|token| self.tokens.admin_for_token(token).ok_or(AuthError::InvalidAdminToken));
        Box::pin(async move {
            match admin {
                Ok(admin_id) => {
                    trace!("🔐️ Request to {} by admin #{admin_id}", req.path());
                    req.extensions_mut().insert(AdminId(admin_id));
                    service.call(req).await
                },
                Err(e) => {
                    warn!("🔐️ Refused admin request to {}. {e}", req.path());
                    Err(ServerError::from(e).into())
                },
            }
        })
    }
}
