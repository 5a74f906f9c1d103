mod admin;

pub use admin::{AdminAuthMiddlewareFactory, AdminAuthMiddlewareService, AdminId, ADMIN_TOKEN_HEADER};
