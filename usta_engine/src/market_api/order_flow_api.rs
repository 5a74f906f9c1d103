use std::{collections::HashSet, fmt::Debug, sync::Arc};

use log::*;

use crate::{
    clock::{Clock, SystemClock},
    db::traits::{CancelGuard, MarketplaceDatabase, OrderTransition, PricedOrder},
    db_types::{
        Actor,
        Azn,
        Candidate,
        Dispatch,
        NewOrder,
        Order,
        OrderEvent,
        OrderId,
        OrderPayment,
        OrderStatusType,
        PaymentMethod,
        PaymentStatus,
        PendingAction,
        Review,
        Subject,
    },
    events::{EventProducers, NotificationKind, OrderStatusChangedEvent, Recipient},
    helpers::haversine_km,
    market_api::{
        block_api::ensure_not_blocked,
        collaborators::Geocoder,
        errors::{MarketplaceError, ValidationError},
        matching_api::ArtisanMatcher,
        order_objects::{DispatchOutcome, OrderQueryFilter},
        policy::{MarketplacePolicy, RejectionPolicy},
    },
};

/// `OrderFlowApi` drives an order from the customer's request to completion or cancellation.
///
/// Every transition is a single guarded write in the storage layer, so concurrent actions on the same order (two
/// artisans accepting at once, a customer cancelling while the artisan sets a price) resolve to exactly one winner.
/// Notifications go out after the write has committed and never undo it.
///
/// ```text
///              accept                complete
/// searching ──────────▶ accepted ───────────▶ completed
///     │  ▲                  │
///     │  └─cannot arrive────┘
///     │
///     └─(bound at creation)─▶ pending ──accept──▶ accepted
///                               │
///                               └──reject──▶ cancelled | searching
/// ```
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    policy: MarketplacePolicy,
    geocoder: Option<Geocoder>,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, clock: Arc::new(SystemClock), policy: MarketplacePolicy::default(), geocoder: None }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: MarketplacePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_geocoder(mut self, geocoder: Geocoder) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn policy(&self) -> &MarketplacePolicy {
        &self.policy
    }
}

impl<B> OrderFlowApi<B>
where B: MarketplaceDatabase
{
    /// Places a new order.
    ///
    /// An order naming an artisan is bound to them straight away (`pending`) and only they are told. Otherwise the
    /// order starts `searching` and is offered to the nearest matching artisans, widening the radius once if nobody is
    /// close. Finding nobody is not an error: the order stays `searching` and the customer is told.
    pub async fn create_order(&self, order: NewOrder) -> Result<DispatchOutcome, MarketplaceError> {
        let now = self.clock.now();
        let customer_id = order.customer_id;
        self.db.fetch_customer(customer_id).await?.ok_or(MarketplaceError::CustomerNotFound(customer_id))?;
        ensure_not_blocked(&self.db, Subject::customer(customer_id), now).await?;
        if order.service.trim().is_empty() {
            return Err(ValidationError::MissingField("service").into());
        }
        match (&order.location, order.artisan_id) {
            (Some(p), _) if !p.is_valid() => return Err(ValidationError::MissingCoordinates.into()),
            (None, None) => return Err(ValidationError::MissingCoordinates.into()),
            _ => {},
        }
        let bound_artisan = match order.artisan_id {
            Some(id) => {
                let artisan = self.db.fetch_artisan(id).await?.ok_or(MarketplaceError::ArtisanNotFound(id))?;
                ensure_not_blocked(&self.db, Subject::artisan(id), now).await?;
                if !artisan.active {
                    return Err(ValidationError::Other(format!("Artisan #{id} is not taking orders")).into());
                }
                if artisan.service != order.service {
                    let service = order.service.clone();
                    return Err(ValidationError::ServiceNotOffered { artisan_id: id, service }.into());
                }
                Some(artisan)
            },
            None => None,
        };
        let place_name = match (&self.geocoder, order.location) {
            (Some(geocoder), Some(location)) => geocoder.resolve_place_name(location).await,
            _ => None,
        };
        let order = self.db.insert_order(order, place_name, now).await?;
        info!("🔄️ Order {} placed by customer #{customer_id} for {}", order.id, order.service);
        let dispatched = match bound_artisan {
            Some(artisan) => {
                let distance_km = order.location().zip(artisan.location()).map(|(a, b)| haversine_km(&a, &b));
                self.offer(&order, artisan.id, distance_km).await;
                Vec::new()
            },
            None => self.dispatch(&order, &HashSet::new()).await,
        };
        Ok(DispatchOutcome { order, dispatched })
    }

    /// The artisan takes the order. Only the first of several concurrent accepts wins; the others get
    /// `OrderNoLongerAvailable` and a notice saying so. Offers made to other artisans are withdrawn.
    pub async fn accept_order(&self, order_id: OrderId, artisan_id: i64) -> Result<Order, MarketplaceError> {
        let now = self.clock.now();
        ensure_not_blocked(&self.db, Subject::artisan(artisan_id), now).await?;
        let accepted = match self.db.accept_order(order_id, artisan_id, now).await {
            Ok(accepted) => accepted,
            Err(MarketplaceError::OrderNoLongerAvailable(id)) => {
                debug!("🔄️ Artisan #{artisan_id} was too late to accept order {id}");
                let kind = NotificationKind::OrderNoLongerAvailable { order_id: id };
                self.producers.notify(Recipient::artisan(artisan_id), kind).await;
                return Err(MarketplaceError::OrderNoLongerAvailable(id));
            },
            Err(e) => return Err(e),
        };
        let order = accepted.order;
        info!("🔄️ Order {order_id} accepted by artisan #{artisan_id}");
        self.withdraw_offers(order_id, &accepted.withdrawn).await;
        let kind = NotificationKind::OrderAccepted { order_id, artisan_id };
        self.producers.notify(Recipient::customer(order.customer_id), kind).await;
        self.status_changed(&order, accepted.old_status, Actor::Artisan(artisan_id)).await;
        Ok(order)
    }

    /// The artisan turns the order down.
    ///
    /// For an open offer on a `searching` order this is a plain decline: the order is untouched and this artisan is
    /// not offered it again. For a `pending` order bound to the artisan, the configured [`RejectionPolicy`] decides
    /// whether the order is cancelled or goes back to `searching` and is offered to someone else.
    pub async fn reject_order(&self, order_id: OrderId, artisan_id: i64) -> Result<DispatchOutcome, MarketplaceError> {
        let now = self.clock.now();
        let order = self.order(order_id).await?;
        if order.status == OrderStatusType::Searching && order.artisan_id.is_none() {
            self.db.decline_offer(order_id, artisan_id, now).await?;
            debug!("🔄️ Artisan #{artisan_id} declined the offer for order {order_id}");
            return Ok(DispatchOutcome { order, dispatched: Vec::new() });
        }
        let reassign = self.policy.rejection_policy == RejectionPolicy::Reassign;
        let transition = self.db.reject_order(order_id, artisan_id, reassign, now).await?;
        info!("🔄️ Artisan #{artisan_id} rejected order {order_id}. It is now {}", transition.order.status);
        self.withdraw_offers(order_id, &transition.withdrawn).await;
        self.status_changed(&transition.order, transition.old_status, Actor::Artisan(artisan_id)).await;
        let customer = Recipient::customer(transition.order.customer_id);
        let dispatched = if reassign {
            self.producers.notify(customer, NotificationKind::SearchingForAnotherArtisan { order_id }).await;
            let mut exclude = self.skip_list(order_id).await;
            exclude.insert(artisan_id);
            self.dispatch(&transition.order, &exclude).await
        } else {
            self.producers.notify(customer, NotificationKind::OrderRejected { order_id }).await;
            Vec::new()
        };
        Ok(DispatchOutcome { order: transition.order, dispatched })
    }

    /// The artisan cannot make it to an order they accepted. The order goes back to `searching` and is offered to the
    /// nearest artisan who has not already declined or dropped it. If nobody is found the customer is told and the
    /// order stays open.
    pub async fn report_cannot_arrive(
        &self,
        order_id: OrderId,
        artisan_id: i64,
    ) -> Result<DispatchOutcome, MarketplaceError> {
        let transition = self.db.release_order(order_id, artisan_id, self.clock.now()).await?;
        info!("🔄️ Artisan #{artisan_id} cannot arrive for order {order_id}. Looking for someone else");
        self.status_changed(&transition.order, transition.old_status, Actor::Artisan(artisan_id)).await;
        let kind = NotificationKind::SearchingForAnotherArtisan { order_id };
        self.producers.notify(Recipient::customer(transition.order.customer_id), kind).await;
        let mut exclude = self.skip_list(order_id).await;
        exclude.insert(artisan_id);
        let dispatched = self.dispatch(&transition.order, &exclude).await;
        Ok(DispatchOutcome { order: transition.order, dispatched })
    }

    /// The artisan names their price.
    ///
    /// If they declared a price range for the order's subservice, the price must fall inside it (bounds inclusive).
    /// The price on the order and the commission split on the payment are written together.
    pub async fn set_price(&self, order_id: OrderId, artisan_id: i64, price: Azn) -> Result<PricedOrder, MarketplaceError> {
        let now = self.clock.now();
        ensure_not_blocked(&self.db, Subject::artisan(artisan_id), now).await?;
        if !price.is_positive() {
            return Err(ValidationError::NonPositivePrice.into());
        }
        let order = self.order(order_id).await?;
        if !order.is_bound_to(artisan_id) {
            return Err(MarketplaceError::NotAssigned { order_id, artisan_id });
        }
        if order.status != OrderStatusType::Accepted {
            return Err(MarketplaceError::InvalidTransition { order_id, status: order.status, action: "priced" });
        }
        if let Some(subservice) = &order.subservice {
            if let Some(range) = self.db.fetch_price_range(artisan_id, subservice).await? {
                if !range.contains(price) {
                    debug!("🔄️ {price} for order {order_id} is outside {}–{}", range.min_price, range.max_price);
                    return Err(ValidationError::PriceOutOfRange { min: range.min_price, max: range.max_price }.into());
                }
            }
        }
        let commission = self.policy.commission.compute_commission(price);
        let priced = self.db.set_order_price(order_id, artisan_id, &commission, now).await?;
        info!(
            "🔄️ Order {order_id} priced at {price}. Commission {} at {}, artisan receives {}",
            commission.admin_fee, commission.rate, commission.artisan_amount
        );
        let kind = NotificationKind::PriceProposed { order_id, price };
        self.producers.notify(Recipient::customer(order.customer_id), kind).await;
        self.producers.notify(Recipient::artisan(artisan_id), NotificationKind::ChoosePaymentMethod { order_id }).await;
        Ok(priced)
    }

    /// As [`Self::set_price`], for a price typed into the chat.
    pub async fn set_price_from_text(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        text: &str,
    ) -> Result<PricedOrder, MarketplaceError> {
        let price = text.parse::<Azn>().map_err(|e| ValidationError::MalformedAmount(e.to_string()))?;
        self.set_price(order_id, artisan_id, price).await
    }

    /// Records how the customer will pay. The order status does not change. For card payments the customer is put
    /// into the receipt upload conversation.
    pub async fn select_payment_method(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        actor: Actor,
    ) -> Result<OrderPayment, MarketplaceError> {
        let now = self.clock.now();
        let order = self.order(order_id).await?;
        match actor {
            Actor::Customer(id) if id != order.customer_id => {
                return Err(MarketplaceError::NotOwner { order_id, customer_id: id });
            },
            Actor::Artisan(id) if !order.is_bound_to(id) => {
                return Err(MarketplaceError::NotAssigned { order_id, artisan_id: id });
            },
            _ => {},
        }
        if order.status.is_terminal() && order.status != OrderStatusType::Completed {
            return Err(MarketplaceError::InvalidTransition { order_id, status: order.status, action: "paid for" });
        }
        let payment = self.db.set_payment_method(order_id, method, now).await?;
        debug!("🔄️ Order {order_id} will be paid by {method}");
        let kind = NotificationKind::PaymentMethodSelected { order_id, method };
        self.producers.notify(Recipient::customer(order.customer_id), kind.clone()).await;
        if let Some(artisan_id) = order.artisan_id {
            self.producers.notify(Recipient::artisan(artisan_id), kind).await;
        }
        if method == PaymentMethod::Card {
            let action = PendingAction::UploadReceipt { order_id };
            let expires_at = now + self.policy.card_receipt_window;
            if let Err(e) = self.db.set_pending_action(Subject::customer(order.customer_id), &action, expires_at, now).await {
                warn!("🔄️ Could not start the receipt upload conversation for order {order_id}: {e}");
            }
        }
        Ok(payment)
    }

    /// The artisan confirms the work is done. The order must be accepted and priced.
    pub async fn complete_order(&self, order_id: OrderId, artisan_id: i64) -> Result<OrderTransition, MarketplaceError> {
        let now = self.clock.now();
        ensure_not_blocked(&self.db, Subject::artisan(artisan_id), now).await?;
        let actor = Actor::Artisan(artisan_id);
        let transition = self.db.complete_order(order_id, Some(artisan_id), actor, now).await?;
        info!("🔄️ Order {order_id} completed by artisan #{artisan_id}");
        self.status_changed(&transition.order, transition.old_status, actor).await;
        let kind = NotificationKind::OrderCompleted { order_id };
        self.producers.notify(Recipient::customer(transition.order.customer_id), kind).await;
        self.after_completion(&transition.order).await;
        Ok(transition)
    }

    /// Cancels an order. Customers can cancel until an artisan accepts; the bound artisan and admins can cancel any
    /// order that is not finished.
    pub async fn cancel_order(&self, order_id: OrderId, actor: Actor) -> Result<OrderTransition, MarketplaceError> {
        let guard = match actor {
            Actor::Customer(id) => CancelGuard::customer(id),
            Actor::Artisan(id) => CancelGuard::artisan(id),
            Actor::Admin(_) | Actor::System => CancelGuard::admin(),
        };
        let transition = self.db.cancel_order(order_id, guard, actor, self.clock.now()).await?;
        info!("🔄️ Order {order_id} cancelled by {actor}");
        self.withdraw_offers(order_id, &transition.withdrawn).await;
        self.status_changed(&transition.order, transition.old_status, actor).await;
        self.notify_cancelled(&transition.order, actor).await;
        Ok(transition)
    }

    /// Forces an order into `accepted`, `completed` or `cancelled`, bypassing the artisan-side guards. Used to settle
    /// disputes. The audit log records the admin as the actor.
    pub async fn admin_override(
        &self,
        order_id: OrderId,
        status: OrderStatusType,
        admin_id: i64,
    ) -> Result<OrderTransition, MarketplaceError> {
        if !matches!(status, OrderStatusType::Accepted | OrderStatusType::Completed | OrderStatusType::Cancelled) {
            let msg = format!("an order can only be forced to accepted, completed or cancelled, not {status}");
            return Err(ValidationError::Other(msg).into());
        }
        let actor = Actor::Admin(admin_id);
        let transition = self.db.force_order_status(order_id, status, actor, self.clock.now()).await?;
        warn!("🔄️ Admin #{admin_id} forced order {order_id} from {} to {status}", transition.old_status);
        self.withdraw_offers(order_id, &transition.withdrawn).await;
        self.status_changed(&transition.order, transition.old_status, actor).await;
        let order = &transition.order;
        let customer = Recipient::customer(order.customer_id);
        match status {
            OrderStatusType::Cancelled => self.notify_cancelled(order, actor).await,
            OrderStatusType::Completed => {
                self.producers.notify(customer, NotificationKind::OrderCompleted { order_id }).await;
                self.after_completion(order).await;
            },
            _ => {
                if let Some(artisan_id) = order.artisan_id {
                    self.producers.notify(customer, NotificationKind::OrderAccepted { order_id, artisan_id }).await;
                }
            },
        }
        Ok(transition)
    }

    /// Asks the customer to review a completed order. Returns true if the request went out; repeated calls, or calls
    /// after the customer has reviewed, do nothing.
    pub async fn request_review(&self, order_id: OrderId) -> Result<bool, MarketplaceError> {
        let order = self.order(order_id).await?;
        let sent = self.db.mark_review_requested(order_id, self.clock.now()).await?;
        if sent {
            debug!("🔄️ Review requested for order {order_id}");
            let kind = NotificationKind::ReviewRequested { order_id };
            self.producers.notify(Recipient::customer(order.customer_id), kind).await;
        } else {
            trace!("🔄️ Review for order {order_id} was already requested or given");
        }
        Ok(sent)
    }

    pub async fn submit_review(
        &self,
        order_id: OrderId,
        customer_id: i64,
        rating: i64,
        comment: Option<String>,
    ) -> Result<Review, MarketplaceError> {
        if !(1..=5).contains(&rating) {
            return Err(ValidationError::RatingOutOfRange(rating).into());
        }
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        let review = self.db.insert_review(order_id, customer_id, rating, comment, self.clock.now()).await?;
        debug!("🔄️ Customer #{customer_id} rated order {order_id} {rating}/5");
        Ok(review)
    }

    pub async fn order(&self, order_id: OrderId) -> Result<Order, MarketplaceError> {
        self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))
    }

    pub async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        ensure_not_blocked(&self.db, Subject::customer(customer_id), self.clock.now()).await?;
        self.db.fetch_orders(OrderQueryFilter::default().with_customer_id(customer_id)).await
    }

    pub async fn orders_for_artisan(&self, artisan_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        ensure_not_blocked(&self.db, Subject::artisan(artisan_id), self.clock.now()).await?;
        self.db.fetch_orders(OrderQueryFilter::default().with_artisan_id(artisan_id)).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, MarketplaceError> {
        trace!("🔄️ Searching orders. {query}");
        self.db.fetch_orders(query).await
    }

    pub async fn order_history(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, MarketplaceError> {
        self.db.fetch_order_events(order_id).await
    }

    pub async fn dispatches(&self, order_id: OrderId) -> Result<Vec<Dispatch>, MarketplaceError> {
        self.db.fetch_dispatches(order_id).await
    }

    pub async fn payment(&self, order_id: OrderId) -> Result<Option<OrderPayment>, MarketplaceError> {
        self.db.fetch_payment(order_id).await
    }

    /// Offers the order to the nearest candidates not in `exclude`. Failures along the way are logged and treated as
    /// "nobody found", since the order itself is already safely stored.
    async fn dispatch(&self, order: &Order, exclude: &HashSet<i64>) -> Vec<Candidate> {
        let matcher = ArtisanMatcher::new(self.db.clone());
        let subservice = order.subservice.as_deref();
        let mut found = Vec::new();
        for radius in [self.policy.search_radius_km, self.policy.expanded_radius_km] {
            match matcher.find_nearby_excluding(order.location(), radius, &order.service, subservice, exclude).await {
                Ok(candidates) if !candidates.is_empty() => {
                    found = candidates;
                    break;
                },
                Ok(_) => debug!("🔄️ Nobody available for order {} within {radius}km", order.id),
                Err(e) => {
                    warn!("🔄️ Could not search for artisans for order {}: {e}", order.id);
                    break;
                },
            }
        }
        found.truncate(self.policy.dispatch_fanout.max(1));
        let mut dispatched = Vec::with_capacity(found.len());
        for candidate in found {
            let now = self.clock.now();
            match self.db.record_dispatch(order.id, candidate.artisan_id, Some(candidate.distance_km), now).await {
                Ok(_) => {
                    self.offer(order, candidate.artisan_id, Some(candidate.distance_km)).await;
                    dispatched.push(candidate);
                },
                Err(e) => warn!("🔄️ Could not offer order {} to artisan #{}: {e}", order.id, candidate.artisan_id),
            }
        }
        if dispatched.is_empty() {
            info!("🔄️ No artisan available for order {}", order.id);
            let kind = NotificationKind::NoArtisanAvailable { order_id: order.id };
            self.producers.notify(Recipient::customer(order.customer_id), kind).await;
        }
        dispatched
    }

    async fn offer(&self, order: &Order, artisan_id: i64, distance_km: Option<f64>) {
        debug!("🔄️ Offering order {} to artisan #{artisan_id}", order.id);
        let kind = NotificationKind::NewOrderOffer { order_id: order.id, service: order.service.clone(), distance_km };
        self.producers.notify(Recipient::artisan(artisan_id), kind).await;
    }

    /// Artisans who declined or dropped this order and must not be offered it again.
    async fn skip_list(&self, order_id: OrderId) -> HashSet<i64> {
        match self.db.fetch_dispatches(order_id).await {
            Ok(dispatches) => dispatches.into_iter().filter(|d| d.status.skips_order()).map(|d| d.artisan_id).collect(),
            Err(e) => {
                warn!("🔄️ Could not load the dispatch log for order {order_id}: {e}");
                HashSet::new()
            },
        }
    }

    async fn withdraw_offers(&self, order_id: OrderId, artisans: &[i64]) {
        for artisan_id in artisans {
            let kind = NotificationKind::OrderWithdrawn { order_id };
            self.producers.notify(Recipient::artisan(*artisan_id), kind).await;
        }
    }

    async fn notify_cancelled(&self, order: &Order, by: Actor) {
        let kind = NotificationKind::OrderCancelled { order_id: order.id, by };
        if by != Actor::Customer(order.customer_id) {
            self.producers.notify(Recipient::customer(order.customer_id), kind.clone()).await;
        }
        if let Some(artisan_id) = order.artisan_id {
            if by != Actor::Artisan(artisan_id) {
                self.producers.notify(Recipient::artisan(artisan_id), kind).await;
            }
        }
    }

    /// Follow-ups once an order is completed: the review request, and for cash orders a prompt for the artisan to
    /// confirm they have the money.
    async fn after_completion(&self, order: &Order) {
        if let Err(e) = self.request_review(order.id).await {
            warn!("🔄️ Could not request a review for order {}: {e}", order.id);
        }
        let Some(artisan_id) = order.artisan_id else { return };
        match self.db.fetch_payment(order.id).await {
            Ok(Some(payment))
                if payment.payment_method == Some(PaymentMethod::Cash) &&
                    payment.payment_status == PaymentStatus::Pending =>
            {
                let kind = NotificationKind::CashConfirmationRequested { order_id: order.id, admin_fee: payment.admin_fee };
                self.producers.notify(Recipient::artisan(artisan_id), kind).await;
            },
            Ok(_) => {},
            Err(e) => warn!("🔄️ Could not load the payment for order {}: {e}", order.id),
        }
    }

    async fn status_changed(&self, order: &Order, old_status: OrderStatusType, actor: Actor) {
        let event = OrderStatusChangedEvent::new(order.id, old_status, order.status, actor);
        self.producers.status_changed(event).await;
    }
}
