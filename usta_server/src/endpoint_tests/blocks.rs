use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json as body;

use super::helpers::{as_admin, json, send, TestSystem, ADMIN_ID};

#[actix_web::test]
async fn block_and_unblock_an_artisan() {
    let system = TestSystem::new().await;
    let artisan = system.artisan("Cavid").await;
    let uri = format!("/admin/blocks/artisan/{artisan}");

    let req = TestRequest::post().uri(&uri).set_json(body!({ "reason": "late commission", "required_payment": "10.35" }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    let record = json(&res);
    assert_eq!(record["required_payment"], 1035);
    assert_eq!(record["blocked_by"], format!("admin:{ADMIN_ID}"));

    let (_, res) = send(&system, as_admin(TestRequest::get().uri(&uri))).await;
    assert_eq!(json(&res)["status"]["blocked"], true);
    assert_eq!(json(&res)["status"]["reason"], "late commission");

    let (status, res) = send(&system, as_admin(TestRequest::delete().uri(&uri))).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    assert_eq!(json(&res)["success"], true);

    let (_, res) = send(&system, as_admin(TestRequest::get().uri(&uri))).await;
    assert_eq!(json(&res)["status"]["blocked"], false);

    let (status, res) = send(&system, as_admin(TestRequest::delete().uri(&uri))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&res)["error"], format!("There is no active block for artisan:{artisan}"));
    system.tear_down().await;
}

#[actix_web::test]
async fn invalid_block_requests() {
    let system = TestSystem::new().await;
    let customer = system.customer("Dilara").await;
    let uri = format!("/admin/blocks/customer/{customer}");

    let req = TestRequest::post().uri(&uri).set_json(body!({ "reason": "no show", "required_payment": "ten" }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(res.contains("Invalid required_payment 'ten'"), "was: {res}");

    let req = TestRequest::post().uri(&uri).set_json(body!({ "reason": "  ", "required_payment": "5" }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&res)["error"], "reason is required");

    let req = TestRequest::get().uri(&format!("/admin/blocks/robot/{customer}"));
    let (status, _) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    system.tear_down().await;
}
