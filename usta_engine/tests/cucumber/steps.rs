use chrono::Duration;
use cucumber::{given, then, when};
use usta_engine::{
    db_types::{Actor, Azn, NewOrder, OrderStatusType, PaymentMethod, Subject},
    events::{NotificationKind, Recipient},
    MarketplaceError,
    MarketplacePolicy,
    ValidationError,
};

use crate::{
    cucumber::MarketWorld,
    support::{km_north, Marketplace, BAKU},
};

fn azn(s: &str) -> Azn {
    s.parse().unwrap_or_else(|e| panic!("'{s}' is not an amount: {e}"))
}

#[given("a fresh marketplace")]
async fn fresh_marketplace(world: &mut MarketWorld) {
    world.system = Some(Marketplace::new().await);
}

#[given(expr = "a fresh marketplace offering new orders to {int} artisans at once")]
async fn fresh_marketplace_with_fanout(world: &mut MarketWorld, fanout: usize) {
    let policy = MarketplacePolicy { dispatch_fanout: fanout, ..Default::default() };
    world.system = Some(Marketplace::with_policy(policy).await);
}

#[given(expr = "customer '{word}'")]
async fn customer(world: &mut MarketWorld, name: String) {
    let customer = world.market().customer(&name).await;
    world.customers.insert(name, customer.id);
}

#[given(expr = "artisan '{word}' offering {string} {float}km from the city centre")]
async fn artisan(world: &mut MarketWorld, name: String, service: String, km: f64) {
    let artisan = world.market().artisan(&name, &service, km_north(km)).await;
    world.artisans.insert(name, artisan.id);
}

#[given(expr = "artisan '{word}' charges between {int} and {int} AZN for {string}")]
async fn price_range(world: &mut MarketWorld, name: String, min: i64, max: i64, subservice: String) {
    let id = world.artisan(&name);
    world.market().price_range(id, &subservice, min, max).await;
}

#[when(expr = "'{word}' requests {string} in the city centre as order {word}")]
async fn request(world: &mut MarketWorld, name: String, service: String, label: String) {
    let customer_id = world.customer(&name);
    let outcome = world.market().request(customer_id, &service, BAKU).await;
    world.orders.insert(label, outcome.order.id);
}

#[when(expr = "'{word}' requests {string} for {string} in the city centre as order {word}")]
async fn request_subservice(world: &mut MarketWorld, name: String, service: String, sub: String, label: String) {
    let customer_id = world.customer(&name);
    let order = NewOrder::new(customer_id, service).with_subservice(sub).with_location(BAKU);
    let outcome = world.market().orders.create_order(order).await.expect("Error creating order");
    world.orders.insert(label, outcome.order.id);
}

#[when(expr = "'{word}' accepts order {word}")]
async fn accept(world: &mut MarketWorld, name: String, label: String) {
    let (artisan_id, order_id) = (world.artisan(&name), world.order(&label));
    let result = world.market().orders.accept_order(order_id, artisan_id).await;
    world.record(result);
}

#[when(expr = "'{word}' and '{word}' accept order {word} at the same time")]
async fn accept_together(world: &mut MarketWorld, first: String, second: String, label: String) {
    let (a, b, order_id) = (world.artisan(&first), world.artisan(&second), world.order(&label));
    let orders = &world.market().orders;
    let (ra, rb) = tokio::join!(orders.accept_order(order_id, a), orders.accept_order(order_id, b));
    assert!(ra.is_ok() != rb.is_ok(), "Expected exactly one accept to succeed. Got {ra:?} and {rb:?}");
}

#[when(expr = "'{word}' prices order {word} at {string}")]
async fn set_price(world: &mut MarketWorld, name: String, label: String, price: String) {
    let (artisan_id, order_id) = (world.artisan(&name), world.order(&label));
    let result = world.market().orders.set_price_from_text(order_id, artisan_id, &price).await;
    world.record(result);
}

#[when(expr = "'{word}' cannot arrive for order {word}")]
async fn cannot_arrive(world: &mut MarketWorld, name: String, label: String) {
    let (artisan_id, order_id) = (world.artisan(&name), world.order(&label));
    let result = world.market().orders.report_cannot_arrive(order_id, artisan_id).await;
    world.record(result);
}

#[when(expr = "'{word}' pays for order {word} by card and uploads receipt {string}")]
async fn pay_by_card(world: &mut MarketWorld, name: String, label: String, file_id: String) {
    let (customer_id, order_id) = (world.customer(&name), world.order(&label));
    let market = world.market();
    let actor = Actor::Customer(customer_id);
    market.orders.select_payment_method(order_id, PaymentMethod::Card, actor).await.expect("Error choosing card");
    market.payments.upload_receipt(order_id, actor, &file_id).await.expect("Error uploading receipt");
}

#[when(expr = "the admin rejects the receipt for order {word}")]
async fn reject_receipt(world: &mut MarketWorld, label: String) {
    let order_id = world.order(&label);
    world.market().payments.reject_receipt(order_id, 1).await.expect("Error rejecting receipt");
}

#[when(expr = "{int} hours pass")]
async fn hours_pass(world: &mut MarketWorld, hours: i64) {
    world.market().clock.advance(Duration::hours(hours));
}

#[when("the escalation worker runs")]
async fn run_escalations(world: &mut MarketWorld) {
    world.market().payments.run_due_escalations().await.expect("Error running escalations");
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut MarketWorld, label: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    let order = world.market().order(world.order(&label)).await;
    assert_eq!(order.status, expected, "Order {label} has the wrong status");
}

#[then(expr = "order {word} is assigned to '{word}'")]
async fn assigned_to(world: &mut MarketWorld, label: String, name: String) {
    let order = world.market().order(world.order(&label)).await;
    assert_eq!(order.artisan_id, Some(world.artisan(&name)));
}

#[then(expr = "order {word} has no artisan")]
async fn unassigned(world: &mut MarketWorld, label: String) {
    let order = world.market().order(world.order(&label)).await;
    assert_eq!(order.artisan_id, None);
}

#[then(expr = "'{word}' was offered order {word}")]
async fn was_offered(world: &mut MarketWorld, name: String, label: String) {
    let order_id = world.order(&label);
    let inbox = world.market().inbox.for_recipient(Recipient::artisan(world.artisan(&name)));
    let offered = inbox.iter().any(|k| matches!(k, NotificationKind::NewOrderOffer { order_id: id, .. } if *id == order_id));
    assert!(offered, "{name} was not offered order {label}");
}

#[then(expr = "'{word}' was offered order {word} only once")]
async fn offered_once(world: &mut MarketWorld, name: String, label: String) {
    let order_id = world.order(&label);
    let inbox = world.market().inbox.for_recipient(Recipient::artisan(world.artisan(&name)));
    let offers =
        inbox.iter().filter(|k| matches!(k, NotificationKind::NewOrderOffer { order_id: id, .. } if *id == order_id)).count();
    assert_eq!(offers, 1);
}

#[then(expr = "exactly one of '{word}' and '{word}' was told order {word} is no longer available")]
async fn one_loser(world: &mut MarketWorld, first: String, second: String, label: String) {
    let order_id = world.order(&label);
    let notice = NotificationKind::OrderNoLongerAvailable { order_id };
    let told = [first, second]
        .iter()
        .filter(|name| world.market().inbox.for_recipient(Recipient::artisan(world.artisan(name))).contains(&notice))
        .count();
    assert_eq!(told, 1);
}

#[then("the action succeeds")]
async fn action_succeeds(world: &mut MarketWorld) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
}

#[then(expr = "the action fails with {string}")]
async fn action_fails(world: &mut MarketWorld, message: String) {
    let err = world.last_error.as_ref().expect("Expected the last action to fail");
    assert_eq!(err.to_string(), message);
}

#[then("the price is rejected as out of range")]
async fn price_out_of_range(world: &mut MarketWorld) {
    let err = world.last_error.as_ref().expect("Expected the price to be rejected");
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::PriceOutOfRange { .. })), "Got {err}");
}

#[then(expr = "order {word} costs {string}")]
async fn order_price(world: &mut MarketWorld, label: String, price: String) {
    let order = world.market().order(world.order(&label)).await;
    assert_eq!(order.price, Some(azn(&price)));
}

#[then(expr = "order {word} has no price")]
async fn no_price(world: &mut MarketWorld, label: String) {
    let order = world.market().order(world.order(&label)).await;
    assert_eq!(order.price, None);
}

#[then(expr = "the payment for order {word} gives {string} to the platform and {string} to the artisan")]
async fn payment_split(world: &mut MarketWorld, label: String, fee: String, share: String) {
    let payment = world.market().orders.payment(world.order(&label)).await.expect("Error fetching payment");
    let payment = payment.expect("Order has no payment");
    assert_eq!(payment.admin_fee, azn(&fee), "Wrong platform commission");
    assert_eq!(payment.artisan_amount, azn(&share), "Wrong artisan share");
}

#[then(expr = "customer '{word}' is blocked until {string} is paid")]
async fn customer_blocked(world: &mut MarketWorld, name: String, amount: String) {
    let id = world.customer(&name);
    let status = world.market().blocks.is_blocked(Subject::customer(id)).await.expect("Error reading block");
    assert!(status.blocked, "{name} is not blocked");
    assert_eq!(status.required_payment, azn(&amount));
    let customer = world.market().participants.customer(id).await.expect("Error fetching customer");
    assert!(!customer.active, "{name} is still active");
}

#[then(expr = "customer '{word}' is not blocked")]
async fn customer_not_blocked(world: &mut MarketWorld, name: String) {
    let id = world.customer(&name);
    let status = world.market().blocks.is_blocked(Subject::customer(id)).await.expect("Error reading block");
    assert!(!status.blocked, "{name} is blocked: {status}");
}
