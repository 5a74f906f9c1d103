use actix_web::{http::StatusCode, test::TestRequest};

use super::helpers::{as_admin, send, TestSystem};
use crate::middleware::ADMIN_TOKEN_HEADER;

#[actix_web::test]
async fn health_needs_no_token() {
    let system = TestSystem::new().await;
    let (status, body) = send(&system, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    system.tear_down().await;
}

#[actix_web::test]
async fn admin_routes_without_a_token() {
    let system = TestSystem::new().await;
    let (status, body) = send(&system, TestRequest::get().uri("/admin/receipts")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("X-Admin-Token"), "was: {body}");
    system.tear_down().await;
}

#[actix_web::test]
async fn admin_routes_with_a_wrong_token() {
    let system = TestSystem::new().await;
    let req = TestRequest::get().uri("/admin/receipts").insert_header((ADMIN_TOKEN_HEADER, "guess"));
    let (status, body) = send(&system, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("not valid"), "was: {body}");
    system.tear_down().await;
}

#[actix_web::test]
async fn admin_routes_with_the_right_token() {
    let system = TestSystem::new().await;
    let (status, body) = send(&system, as_admin(TestRequest::get().uri("/admin/receipts"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
    system.tear_down().await;
}
