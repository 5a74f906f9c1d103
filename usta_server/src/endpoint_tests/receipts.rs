use actix_web::{http::StatusCode, test::TestRequest};
use chrono::Duration;

use super::helpers::{as_admin, json, send, TestSystem};

#[actix_web::test]
async fn approve_a_card_receipt() {
    let system = TestSystem::new().await;
    let customer = system.customer("Aysel").await;
    let artisan = system.artisan("Anar").await;
    let order_id = system.card_order_with_receipt(customer, artisan, 50).await;

    let (status, body) = send(&system, as_admin(TestRequest::get().uri("/admin/receipts?kind=card_payment"))).await;
    assert_eq!(status, StatusCode::OK);
    let queue = json(&body);
    assert_eq!(queue.as_array().map(Vec::len), Some(1));
    assert_eq!(queue[0]["order_id"], order_id.value());
    assert_eq!(queue[0]["receipt_file_id"], "receipt-photo-1");

    let uri = format!("/admin/receipts/{}/approve", order_id.value());
    let (status, body) = send(&system, as_admin(TestRequest::post().uri(&uri))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let payment = json(&body);
    assert_eq!(payment["receipt_verified"], true);
    assert_eq!(payment["payment_status"], "completed");

    let (_, body) = send(&system, as_admin(TestRequest::get().uri("/admin/receipts"))).await;
    assert_eq!(body, "[]");

    // Approving twice is a conflict, not a second approval
    let (status, body) = send(&system, as_admin(TestRequest::post().uri(&uri))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json(&body)["error"], format!("The payment for order {order_id} is already finalised"));
    system.tear_down().await;
}

#[actix_web::test]
async fn rejected_receipt_escalates_to_a_block() {
    let system = TestSystem::new().await;
    let customer = system.customer("Bahar").await;
    let artisan = system.artisan("Babek").await;
    let order_id = system.card_order_with_receipt(customer, artisan, 50).await;

    let uri = format!("/admin/receipts/{}/reject", order_id.value());
    let (status, body) = send(&system, as_admin(TestRequest::post().uri(&uri))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["receipt_verified"], false);

    // Nothing is due yet
    let (_, body) = send(&system, as_admin(TestRequest::post().uri("/admin/escalations/run"))).await;
    assert_eq!(json(&body)["executed"].as_array().map(Vec::len), Some(0));

    system.clock.advance(Duration::hours(24) + Duration::minutes(1));
    let (status, body) = send(&system, as_admin(TestRequest::post().uri("/admin/escalations/run"))).await;
    assert_eq!(status, StatusCode::OK);
    let report = json(&body);
    assert_eq!(report["executed"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["executed"][0]["subject_id"], customer);

    let uri = format!("/admin/blocks/customer/{customer}");
    let (status, body) = send(&system, as_admin(TestRequest::get().uri(&uri))).await;
    assert_eq!(status, StatusCode::OK);
    let summary = json(&body);
    assert_eq!(summary["status"]["blocked"], true);
    // 50 AZN times the 1.5 customer penalty, in qəpik
    assert_eq!(summary["status"]["required_payment"], 7500);
    assert_eq!(summary["history"].as_array().map(Vec::len), Some(1));
    system.tear_down().await;
}

#[actix_web::test]
async fn approving_an_unknown_order() {
    let system = TestSystem::new().await;
    let (status, body) = send(&system, as_admin(TestRequest::post().uri("/admin/receipts/99/approve"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "Order #99 does not exist");
    system.tear_down().await;
}
