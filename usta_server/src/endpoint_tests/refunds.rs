use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json as body;
use usta_common::Secret;

use super::helpers::{as_admin, json, send, TestSystem, ADMIN_ID};

#[actix_web::test]
async fn refund_from_request_to_payout() {
    let system = TestSystem::new().await;
    let customer = system.customer("Hikmet").await;
    let artisan = system.artisan("Huseyn").await;
    let order_id = system.card_order_with_receipt(customer, artisan, 50).await;

    let req = TestRequest::post().uri("/admin/refunds").set_json(body!({
        "order_id": order_id.value(),
        "amount": "20.00",
        "reason": "the tap still leaks"
    }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    let refund = json(&res);
    assert_eq!(refund["status"], "pending");
    assert_eq!(refund["amount"], 2000);
    assert_eq!(refund["customer_id"], customer);
    assert_eq!(refund["requested_by"], format!("admin:{ADMIN_ID}"));
    assert!(refund.get("payout_card").is_none());
    let refund_id = refund["id"].as_i64().expect("refund id");

    // No card yet, so there is nothing to reveal
    let card_uri = format!("/admin/refunds/{refund_id}/card");
    let (status, _) = send(&system, as_admin(TestRequest::get().uri(&card_uri))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    system.refunds().provide_card(customer, Secret::new("4169 7388 1234 5678".into())).await.expect("Error giving card");
    let (_, res) = send(&system, as_admin(TestRequest::get().uri(&format!("/admin/refunds/{refund_id}")))).await;
    assert_eq!(json(&res)["status"], "pending_admin");
    assert!(!res.contains("4169"), "card leaked: {res}");

    let (status, res) = send(&system, as_admin(TestRequest::get().uri(&card_uri))).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    assert_eq!(json(&res)["card_number"], "4169738812345678");

    let complete_uri = format!("/admin/refunds/{refund_id}/complete");
    let (status, res) = send(&system, as_admin(TestRequest::post().uri(&complete_uri))).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    assert_eq!(json(&res)["status"], "completed");
    assert_eq!(json(&res)["completed_by"], format!("admin:{ADMIN_ID}"));

    let (status, _) = send(&system, as_admin(TestRequest::post().uri(&complete_uri))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, res) = send(&system, as_admin(TestRequest::get().uri("/admin/refunds?status=completed"))).await;
    let completed = json(&res);
    assert_eq!(completed.as_array().map(Vec::len), Some(1));
    assert_eq!(completed[0]["id"], refund_id);
    let (_, res) = send(&system, as_admin(TestRequest::get().uri("/admin/refunds?status=pending"))).await;
    assert_eq!(res, "[]");
    system.tear_down().await;
}

#[actix_web::test]
async fn refunds_cannot_exceed_the_payment() {
    let system = TestSystem::new().await;
    let customer = system.customer("Ilaha").await;
    let artisan = system.artisan("Ilkin").await;
    let order_id = system.card_order_with_receipt(customer, artisan, 50).await;

    let req = TestRequest::post().uri("/admin/refunds").set_json(body!({
        "order_id": order_id.value(),
        "amount": "50.01",
        "reason": "overcharged"
    }));
    let (status, res) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(res.contains("exceeds"), "was: {res}");

    for (amount, expected) in [("30", StatusCode::OK), ("30", StatusCode::BAD_REQUEST)] {
        let req = TestRequest::post().uri("/admin/refunds").set_json(body!({
            "order_id": order_id.value(),
            "amount": amount,
            "reason": "partly overcharged"
        }));
        let (status, res) = send(&system, as_admin(req)).await;
        assert_eq!(status, expected, "was: {res}");
    }

    let req = TestRequest::post().uri("/admin/refunds").set_json(body!({
        "order_id": 999,
        "amount": "5",
        "reason": "overcharged"
    }));
    let (status, _) = send(&system, as_admin(req)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&system, as_admin(TestRequest::get().uri("/admin/refunds/31"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    system.tear_down().await;
}
