mod support;

use usta_engine::{
    db_types::{Actor, Azn, DispatchStatus, NewOrder, OrderStatusType, PaymentMethod, PendingAction, Subject},
    events::{NotificationKind, Recipient},
    MarketplaceError,
    MarketplacePolicy,
    RejectionPolicy,
    ValidationError,
};

use crate::support::{km_north, Marketplace, BAKU};

#[tokio::test]
async fn fifty_manat_order_splits_six_and_forty_four() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let order = m.priced_order(alice.id, rauf.id, 50).await;
    let payment = m.orders.payment(order.id).await.unwrap().expect("payment row exists");
    assert_eq!(payment.amount, Azn::from_manat(50));
    assert_eq!(payment.admin_fee, Azn::from_manat(6));
    assert_eq!(payment.artisan_amount, Azn::from_manat(44));
    assert_eq!(payment.admin_fee + payment.artisan_amount, payment.amount);
    m.tear_down().await;
}

#[tokio::test]
async fn new_order_goes_to_the_nearest_artisan() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let _far = m.artisan("Far", "plumber", km_north(4.0)).await;
    let near = m.artisan("Near", "plumber", km_north(1.0)).await;
    let _electrician = m.artisan("Sparky", "electrician", km_north(0.2)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    assert_eq!(outcome.order.status, OrderStatusType::Searching);
    assert_eq!(outcome.dispatched.first().map(|c| c.artisan_id), Some(near.id));
    let offers = m.inbox.for_recipient(Recipient::artisan(near.id));
    assert!(matches!(offers.as_slice(), [NotificationKind::NewOrderOffer { .. }]));
    m.tear_down().await;
}

#[tokio::test]
async fn search_widens_when_nobody_is_close() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let distant = m.artisan("Distant", "plumber", km_north(10.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    assert_eq!(outcome.dispatched.first().map(|c| c.artisan_id), Some(distant.id));
    let distance = outcome.dispatched[0].distance_km;
    assert!((9.5..10.5).contains(&distance), "distance was {distance}");
    m.tear_down().await;
}

#[tokio::test]
async fn nobody_in_range_leaves_the_order_searching() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let _ = m.artisan("Remote", "plumber", km_north(40.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    assert!(outcome.dispatched.is_empty());
    assert_eq!(m.order(outcome.order.id).await.status, OrderStatusType::Searching);
    let told = m.inbox.for_recipient(Recipient::customer(alice.id));
    assert_eq!(told, vec![NotificationKind::NoArtisanAvailable { order_id: outcome.order.id }]);
    m.tear_down().await;
}

#[tokio::test]
async fn order_without_location_needs_a_bound_artisan() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let err = m.orders.create_order(NewOrder::new(alice.id, "plumber")).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::MissingCoordinates)));
    let err = m.orders.create_order(NewOrder::new(alice.id, " ").with_location(BAKU)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::MissingField("service"))));
    m.tear_down().await;
}

#[tokio::test]
async fn a_bound_artisan_must_offer_the_requested_service() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let sparky = m.artisan("Sparky", "electrician", km_north(1.0)).await;
    let order = NewOrder::new(alice.id, "plumber").with_location(BAKU).for_artisan(sparky.id);
    let err = m.orders.create_order(order).await.unwrap_err();
    match err {
        MarketplaceError::Validation(ValidationError::ServiceNotOffered { artisan_id, service }) => {
            assert_eq!(artisan_id, sparky.id);
            assert_eq!(service, "plumber");
        },
        other => panic!("expected a service mismatch, got {other:?}"),
    }
    assert!(m.inbox.for_recipient(Recipient::artisan(sparky.id)).is_empty());

    let order = NewOrder::new(alice.id, "electrician").for_artisan(sparky.id);
    let outcome = m.orders.create_order(order).await.unwrap();
    assert_eq!(outcome.order.artisan_id, Some(sparky.id));
    m.tear_down().await;
}

#[tokio::test]
async fn accepting_withdraws_the_other_offers() {
    let policy = MarketplacePolicy { dispatch_fanout: 3, ..Default::default() };
    let m = Marketplace::with_policy(policy).await;
    let alice = m.customer("Alice").await;
    let a = m.artisan("Anar", "plumber", km_north(1.0)).await;
    let b = m.artisan("Babek", "plumber", km_north(2.0)).await;
    let c = m.artisan("Cavid", "plumber", km_north(3.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    assert_eq!(outcome.dispatched.len(), 3);
    let order_id = outcome.order.id;

    let order = m.orders.accept_order(order_id, b.id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Accepted);
    assert_eq!(order.artisan_id, Some(b.id));
    for loser in [a.id, c.id] {
        let kinds = m.inbox.for_recipient(Recipient::artisan(loser));
        assert!(kinds.contains(&NotificationKind::OrderWithdrawn { order_id }), "artisan #{loser} not told");
    }
    let told = m.inbox.for_recipient(Recipient::customer(alice.id));
    assert!(told.contains(&NotificationKind::OrderAccepted { order_id, artisan_id: b.id }));

    let err = m.orders.accept_order(order_id, a.id).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::OrderNoLongerAvailable(id) if id == order_id));
    let kinds = m.inbox.for_recipient(Recipient::artisan(a.id));
    assert!(kinds.contains(&NotificationKind::OrderNoLongerAvailable { order_id }));

    let dispatches = m.orders.dispatches(order_id).await.unwrap();
    let accepted = dispatches.iter().filter(|d| d.status == DispatchStatus::Accepted).count();
    let superseded = dispatches.iter().filter(|d| d.status == DispatchStatus::Superseded).count();
    assert_eq!((accepted, superseded), (1, 2));

    let changes = m.inbox.status_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].old_status, OrderStatusType::Searching);
    assert_eq!(changes[0].new_status, OrderStatusType::Accepted);
    assert_eq!(changes[0].actor, Actor::Artisan(b.id));
    m.tear_down().await;
}

#[tokio::test]
async fn declining_an_open_offer_leaves_the_order_alone() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let a = m.artisan("Anar", "plumber", km_north(1.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    let declined = m.orders.reject_order(outcome.order.id, a.id).await.unwrap();
    assert!(declined.dispatched.is_empty());
    assert_eq!(m.order(outcome.order.id).await.status, OrderStatusType::Searching);
    let dispatches = m.orders.dispatches(outcome.order.id).await.unwrap();
    assert_eq!(dispatches[0].status, DispatchStatus::Declined);
    // Declining twice is harmless
    m.orders.reject_order(outcome.order.id, a.id).await.unwrap();
    m.tear_down().await;
}

#[tokio::test]
async fn bound_artisan_rejecting_cancels_by_default() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let order = NewOrder::new(alice.id, "plumber").with_location(BAKU).for_artisan(rauf.id);
    let outcome = m.orders.create_order(order).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatusType::Pending);
    assert_eq!(outcome.order.artisan_id, Some(rauf.id));

    let rejected = m.orders.reject_order(outcome.order.id, rauf.id).await.unwrap();
    assert_eq!(rejected.order.status, OrderStatusType::Cancelled);
    let told = m.inbox.for_recipient(Recipient::customer(alice.id));
    assert_eq!(told, vec![NotificationKind::OrderRejected { order_id: outcome.order.id }]);
    m.tear_down().await;
}

#[tokio::test]
async fn bound_artisan_rejecting_reassigns_when_configured() {
    let policy = MarketplacePolicy { rejection_policy: RejectionPolicy::Reassign, ..Default::default() };
    let m = Marketplace::with_policy(policy).await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(0.5)).await;
    let other = m.artisan("Other", "plumber", km_north(2.0)).await;
    let order = NewOrder::new(alice.id, "plumber").with_location(BAKU).for_artisan(rauf.id);
    let outcome = m.orders.create_order(order).await.unwrap();

    let rejected = m.orders.reject_order(outcome.order.id, rauf.id).await.unwrap();
    assert_eq!(rejected.order.status, OrderStatusType::Searching);
    assert_eq!(rejected.order.artisan_id, None);
    assert_eq!(rejected.dispatched.first().map(|c| c.artisan_id), Some(other.id));
    m.tear_down().await;
}

#[tokio::test]
async fn cannot_arrive_sends_the_order_to_someone_else() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let first = m.artisan("First", "plumber", km_north(1.0)).await;
    let second = m.artisan("Second", "plumber", km_north(6.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    assert_eq!(outcome.dispatched.first().map(|c| c.artisan_id), Some(first.id));
    m.orders.accept_order(outcome.order.id, first.id).await.unwrap();
    m.inbox.clear();

    let released = m.orders.report_cannot_arrive(outcome.order.id, first.id).await.unwrap();
    assert_eq!(released.order.status, OrderStatusType::Searching);
    assert_eq!(released.order.artisan_id, None);
    // The second artisan is beyond the first radius, so this also exercises the widened search
    assert_eq!(released.dispatched.first().map(|c| c.artisan_id), Some(second.id));
    assert!(m.inbox.for_recipient(Recipient::artisan(first.id)).is_empty());
    let offers = m.inbox.for_recipient(Recipient::artisan(second.id));
    assert!(matches!(offers.as_slice(), [NotificationKind::NewOrderOffer { .. }]));
    let told = m.inbox.for_recipient(Recipient::customer(alice.id));
    assert!(told.contains(&NotificationKind::SearchingForAnotherArtisan { order_id: outcome.order.id }));
    m.tear_down().await;
}

#[tokio::test]
async fn cannot_arrive_only_applies_to_your_own_accepted_order() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let first = m.artisan("First", "plumber", km_north(1.0)).await;
    let intruder = m.artisan("Intruder", "plumber", km_north(30.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    let err = m.orders.report_cannot_arrive(outcome.order.id, first.id).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::NotAssigned { .. }));
    m.orders.accept_order(outcome.order.id, first.id).await.unwrap();
    let err = m.orders.report_cannot_arrive(outcome.order.id, intruder.id).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::NotAssigned { .. }));
    m.tear_down().await;
}

#[tokio::test]
async fn price_must_fall_inside_the_declared_range() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    m.price_range(rauf.id, "kombi təmiri", 40, 90).await;
    let order = NewOrder::new(alice.id, "plumber").with_subservice("kombi təmiri").with_location(BAKU);
    let outcome = m.orders.create_order(order).await.unwrap();
    assert_eq!(outcome.dispatched.first().map(|c| c.artisan_id), Some(rauf.id));
    let order_id = outcome.order.id;
    m.orders.accept_order(order_id, rauf.id).await.unwrap();

    let err = m.orders.set_price(order_id, rauf.id, Azn::from_manat(35)).await.unwrap_err();
    assert_eq!(err.to_string(), "price must be within 40.00 AZN–90.00 AZN");
    let err = m.orders.set_price(order_id, rauf.id, Azn::from_qepik(3999)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::PriceOutOfRange { .. })));
    let err = m.orders.set_price(order_id, rauf.id, Azn::from_qepik(9001)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::PriceOutOfRange { .. })));
    assert_eq!(m.order(order_id).await.price, None);

    let priced = m.orders.set_price(order_id, rauf.id, Azn::from_manat(40)).await.unwrap();
    assert_eq!(priced.order.price, Some(Azn::from_manat(40)));
    let priced = m.orders.set_price(order_id, rauf.id, Azn::from_manat(90)).await.unwrap();
    assert_eq!(priced.order.price, Some(Azn::from_manat(90)));
    assert_eq!(priced.payment.amount, Azn::from_manat(90));
    m.tear_down().await;
}

#[tokio::test]
async fn prices_typed_into_the_chat_are_parsed() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    m.orders.accept_order(outcome.order.id, rauf.id).await.unwrap();
    let priced = m.orders.set_price_from_text(outcome.order.id, rauf.id, "49,90 AZN").await.unwrap();
    assert_eq!(priced.order.price, Some(Azn::from_qepik(4990)));
    let err = m.orders.set_price_from_text(outcome.order.id, rauf.id, "fifty").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::MalformedAmount(_))));
    let err = m.orders.set_price_from_text(outcome.order.id, rauf.id, "0").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::NonPositivePrice)));
    let told = m.inbox.for_recipient(Recipient::customer(alice.id));
    assert!(told.contains(&NotificationKind::PriceProposed {
        order_id: outcome.order.id,
        price: Azn::from_qepik(4990)
    }));
    m.tear_down().await;
}

#[tokio::test]
async fn card_payment_opens_the_receipt_conversation() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let order = m.priced_order(alice.id, rauf.id, 50).await;
    let err = m.orders.select_payment_method(order.id, PaymentMethod::Card, Actor::Customer(alice.id + 100)).await;
    assert!(matches!(err, Err(MarketplaceError::NotOwner { .. })));
    let payment = m.orders.select_payment_method(order.id, PaymentMethod::Card, Actor::Customer(alice.id)).await.unwrap();
    assert_eq!(payment.payment_method, Some(PaymentMethod::Card));
    let action = m.conversations.current(Subject::customer(alice.id)).await.unwrap();
    assert_eq!(action, Some(PendingAction::UploadReceipt { order_id: order.id }));
    m.tear_down().await;
}

#[tokio::test]
async fn completion_needs_a_price_and_requests_one_review() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    let order_id = outcome.order.id;
    m.orders.accept_order(order_id, rauf.id).await.unwrap();
    let err = m.orders.complete_order(order_id, rauf.id).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::PriceNotSet(id) if id == order_id));

    m.orders.set_price(order_id, rauf.id, Azn::from_manat(60)).await.unwrap();
    let done = m.orders.complete_order(order_id, rauf.id).await.unwrap();
    assert_eq!(done.order.status, OrderStatusType::Completed);
    assert!(done.order.completed_at.is_some());
    assert!(!m.orders.request_review(order_id).await.unwrap());
    let told = m.inbox.for_recipient(Recipient::customer(alice.id));
    let requests = told.iter().filter(|k| matches!(k, NotificationKind::ReviewRequested { .. })).count();
    assert_eq!(requests, 1);

    let err = m.orders.submit_review(order_id, alice.id, 6, None).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(ValidationError::RatingOutOfRange(6))));
    let review = m.orders.submit_review(order_id, alice.id, 5, Some(" Əla iş ".into())).await.unwrap();
    assert_eq!(review.artisan_id, rauf.id);
    assert_eq!(review.comment.as_deref(), Some("Əla iş"));
    let err = m.orders.submit_review(order_id, alice.id, 4, None).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::AlreadyReviewed(_)));
    m.tear_down().await;
}

#[tokio::test]
async fn cash_completion_asks_the_artisan_to_confirm() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let order = m.priced_order(alice.id, rauf.id, 50).await;
    m.orders.select_payment_method(order.id, PaymentMethod::Cash, Actor::Artisan(rauf.id)).await.unwrap();
    m.orders.complete_order(order.id, rauf.id).await.unwrap();
    let kinds = m.inbox.for_recipient(Recipient::artisan(rauf.id));
    assert!(kinds.contains(&NotificationKind::CashConfirmationRequested {
        order_id: order.id,
        admin_fee: Azn::from_manat(6)
    }));
    m.tear_down().await;
}

#[tokio::test]
async fn customers_cancel_only_before_acceptance() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let bob = m.customer("Bob").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let first = m.request(alice.id, "plumber", BAKU).await;
    let err = m.orders.cancel_order(first.order.id, Actor::Customer(bob.id)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::NotOwner { .. }));
    let cancelled = m.orders.cancel_order(first.order.id, Actor::Customer(alice.id)).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatusType::Cancelled);
    assert_eq!(cancelled.withdrawn, vec![rauf.id]);
    let kinds = m.inbox.for_recipient(Recipient::artisan(rauf.id));
    assert!(kinds.contains(&NotificationKind::OrderWithdrawn { order_id: first.order.id }));

    let second = m.request(alice.id, "plumber", BAKU).await;
    m.orders.accept_order(second.order.id, rauf.id).await.unwrap();
    let err = m.orders.cancel_order(second.order.id, Actor::Customer(alice.id)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidTransition { status: OrderStatusType::Accepted, .. }));
    let cancelled = m.orders.cancel_order(second.order.id, Actor::Artisan(rauf.id)).await.unwrap();
    assert_eq!(cancelled.old_status, OrderStatusType::Accepted);
    let told = m.inbox.for_recipient(Recipient::customer(alice.id));
    assert!(told.contains(&NotificationKind::OrderCancelled { order_id: second.order.id, by: Actor::Artisan(rauf.id) }));
    m.tear_down().await;
}

#[tokio::test]
async fn admin_override_is_recorded_in_the_audit_log() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let order = m.priced_order(alice.id, rauf.id, 50).await;
    m.orders.complete_order(order.id, rauf.id).await.unwrap();

    let err = m.orders.admin_override(order.id, OrderStatusType::Searching, 1).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(_)));
    let forced = m.orders.admin_override(order.id, OrderStatusType::Cancelled, 1).await.unwrap();
    assert_eq!(forced.old_status, OrderStatusType::Completed);
    assert_eq!(forced.order.status, OrderStatusType::Cancelled);

    let history = m.orders.order_history(order.id).await.unwrap();
    let actions = history.iter().map(|e| e.action.as_str()).collect::<Vec<_>>();
    assert_eq!(actions.first(), Some(&"created"));
    assert!(actions.contains(&"accepted"));
    assert!(actions.contains(&"price_set"));
    assert!(actions.contains(&"completed"));
    let last = history.last().unwrap();
    assert_eq!(last.action, "status_override");
    assert_eq!(last.actor, "admin:1");
    assert_eq!(last.from_status, Some(OrderStatusType::Completed));
    assert_eq!(last.to_status, Some(OrderStatusType::Cancelled));
    m.tear_down().await;
}

#[tokio::test]
async fn blocked_artisans_are_stopped_at_the_door() {
    let m = Marketplace::new().await;
    let alice = m.customer("Alice").await;
    let rauf = m.artisan("Rauf", "plumber", km_north(1.0)).await;
    let outcome = m.request(alice.id, "plumber", BAKU).await;
    m.blocks.block(Subject::artisan(rauf.id), "unpaid commission", Azn::from_manat(12), 1, None).await.unwrap();

    let err = m.orders.accept_order(outcome.order.id, rauf.id).await.unwrap_err();
    let status = match err {
        MarketplaceError::Blocked(status) => status,
        other => panic!("expected a block, got {other}"),
    };
    assert_eq!(status.reason.as_deref(), Some("unpaid commission"));
    assert_eq!(status.required_payment, Azn::from_manat(12));
    assert!(matches!(m.orders.orders_for_artisan(rauf.id).await, Err(MarketplaceError::Blocked(_))));

    // Blocked artisans are inactive, so new requests pass them by
    let again = m.request(alice.id, "plumber", BAKU).await;
    assert!(again.dispatched.is_empty());

    m.blocks.unblock(Subject::artisan(rauf.id), 1).await.unwrap();
    m.orders.accept_order(outcome.order.id, rauf.id).await.unwrap();
    let orders = m.orders.orders_for_artisan(rauf.id).await.unwrap();
    assert_eq!(orders.len(), 1);
    m.tear_down().await;
}
