use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json as body;

use super::helpers::{as_admin, json, send, TestSystem, ADMIN_ID};

#[actix_web::test]
async fn order_details() {
    let system = TestSystem::new().await;
    let customer = system.customer("Elvin").await;
    let artisan = system.artisan("Emin").await;
    let order_id = system.card_order_with_receipt(customer, artisan, 40).await;

    let uri = format!("/admin/orders/{}", order_id.value());
    let (status, res) = send(&system, as_admin(TestRequest::get().uri(&uri))).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    let details = json(&res);
    assert_eq!(details["order"]["id"], order_id.value());
    assert_eq!(details["order"]["status"], "accepted");
    assert_eq!(details["order"]["artisan_id"], artisan);
    assert_eq!(details["order"]["price"], 4000);
    assert_eq!(details["payment"]["payment_method"], "card");
    assert_eq!(details["payment"]["receipt_file_id"], "receipt-photo-1");
    assert!(details["dispatches"].is_array());
    assert!(!details["history"].as_array().map(Vec::is_empty).unwrap_or(true));
    system.tear_down().await;
}

#[actix_web::test]
async fn admin_forces_an_order_to_completed() {
    let system = TestSystem::new().await;
    let customer = system.customer("Farid").await;
    let artisan = system.artisan("Fuad").await;
    let order_id = system.card_order_with_receipt(customer, artisan, 40).await;

    let uri = format!("/admin/orders/{}/override", order_id.value());
    let req = TestRequest::post().uri(&uri).set_json(body!({ "status": "completed" }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    assert_eq!(json(&res)["status"], "completed");

    let uri = format!("/admin/orders/{}", order_id.value());
    let (_, res) = send(&system, as_admin(TestRequest::get().uri(&uri))).await;
    let details = json(&res);
    let history = details["history"].as_array().cloned().unwrap_or_default();
    let forced = history.iter().find(|e| e["action"] == "status_override").expect("no override in the history");
    assert_eq!(forced["actor"], format!("admin:{ADMIN_ID}"));
    assert_eq!(forced["from_status"], "accepted");
    assert_eq!(forced["to_status"], "completed");
    system.tear_down().await;
}

#[actix_web::test]
async fn invalid_overrides() {
    let system = TestSystem::new().await;
    let customer = system.customer("Gunel").await;
    let artisan = system.artisan("Gurban").await;
    let order_id = system.card_order_with_receipt(customer, artisan, 40).await;

    let uri = format!("/admin/orders/{}/override", order_id.value());
    let req = TestRequest::post().uri(&uri).set_json(body!({ "status": "searching" }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(res.contains("not searching"), "was: {res}");

    let req = TestRequest::post().uri("/admin/orders/404/override").set_json(body!({ "status": "cancelled" }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&res)["error"], "Order #404 does not exist");
    system.tear_down().await;
}
