//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every handler is async and awaits the engine. Nothing here may block the worker thread, since actix workers process
//! their requests sequentially and a blocking handler stalls every request queued behind it.
//!
//! All routes apart from `/health` live in the `/admin` scope, which is guarded by the admin token middleware. The
//! middleware stores the authenticated [`AdminId`] in the request, and handlers pass it to the engine so the audit
//! trail names the admin who acted.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use usta_common::Secret;
use usta_engine::{
    db_types::{OrderId, Subject},
    BlockApi,
    MarketplaceDatabase,
    OrderFlowApi,
    PaymentVerificationApi,
    RefundApi,
};

use crate::{
    data_objects::{
        parse_amount,
        BlockParams,
        BlockSummary,
        JsonResponse,
        OrderDetails,
        OverrideParams,
        PayoutCard,
        ReceiptQueueParams,
        RefundParams,
        RefundQueryParams,
        SubjectPath,
    },
    errors::ServerError,
    middleware::AdminId,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Receipts  ----------------------------------------------------
route!(receipt_queue => Get "/receipts" impl MarketplaceDatabase);
/// The admin review queue: receipts awaiting a decision, oldest first.
///
/// Query parameters:
/// * `kind` - `card_payment` or `cash_commission`. Both kinds are listed if omitted.
/// * `include_rejected` - also list payments whose last receipt was rejected and are waiting for a new upload.
pub async fn receipt_queue<B: MarketplaceDatabase>(
    query: web::Query<ReceiptQueueParams>,
    api: web::Data<PaymentVerificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let ReceiptQueueParams { kind, include_rejected } = query.into_inner();
    debug!("💻️ GET receipt queue (kind: {kind:?}, include rejected: {include_rejected})");
    let queue = api.receipt_queue(kind, include_rejected).await?;
    Ok(HttpResponse::Ok().json(queue))
}

route!(approve_receipt => Post "/receipts/{order_id}/approve" impl MarketplaceDatabase);
pub async fn approve_receipt<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    admin: web::ReqData<AdminId>,
    api: web::Data<PaymentVerificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    debug!("💻️ POST approve receipt for order {order_id}");
    let payment = api.approve_receipt(order_id, admin.0).await?;
    Ok(HttpResponse::Ok().json(payment))
}

route!(reject_receipt => Post "/receipts/{order_id}/reject" impl MarketplaceDatabase);
/// Rejects the receipt under review. The responsible party is asked for a new one and the deadline restarts.
pub async fn reject_receipt<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    admin: web::ReqData<AdminId>,
    api: web::Data<PaymentVerificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    debug!("💻️ POST reject receipt for order {order_id}");
    let resolved = api.reject_receipt(order_id, admin.0).await?;
    Ok(HttpResponse::Ok().json(resolved.payment))
}

route!(run_escalations => Post "/escalations/run" impl MarketplaceDatabase);
/// Runs the escalation pass now instead of waiting for the worker.
pub async fn run_escalations<B: MarketplaceDatabase>(
    admin: web::ReqData<AdminId>,
    api: web::Data<PaymentVerificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ Admin #{} triggered an escalation pass", admin.0);
    let report = api.run_due_escalations().await?;
    Ok(HttpResponse::Ok().json(report))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/orders/{order_id}" impl MarketplaceDatabase);
pub async fn order_by_id<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    debug!("💻️ GET order {order_id}");
    let order = api.order(order_id).await?;
    let payment = api.payment(order_id).await?;
    let dispatches = api.dispatches(order_id).await?;
    let history = api.order_history(order_id).await?;
    Ok(HttpResponse::Ok().json(OrderDetails { order, payment, dispatches, history }))
}

route!(override_order => Post "/orders/{order_id}/override" impl MarketplaceDatabase);
/// Forces an order into `accepted`, `completed` or `cancelled`. The audit log records the admin as the actor.
pub async fn override_order<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    body: web::Json<OverrideParams>,
    admin: web::ReqData<AdminId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let status = body.into_inner().status;
    info!("💻️ Admin #{} is forcing order {order_id} to {status}", admin.0);
    let transition = api.admin_override(order_id, status, admin.0).await?;
    Ok(HttpResponse::Ok().json(transition.order))
}

//----------------------------------------------   Blocks  ----------------------------------------------------
route!(block_status => Get "/blocks/{kind}/{id}" impl MarketplaceDatabase);
pub async fn block_status<B: MarketplaceDatabase>(
    path: web::Path<SubjectPath>,
    api: web::Data<BlockApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let subject = Subject::from(path.into_inner());
    debug!("💻️ GET block status for {subject}");
    let status = api.is_blocked(subject).await?;
    let history = api.history(subject).await?;
    Ok(HttpResponse::Ok().json(BlockSummary { status, history }))
}

route!(block_subject => Post "/blocks/{kind}/{id}" impl MarketplaceDatabase);
/// Blocks a customer or artisan until they pay `required_payment` (e.g. `"10.35"`), or until `until` if given.
/// Blocking someone who is already blocked adds to what they owe.
pub async fn block_subject<B: MarketplaceDatabase>(
    path: web::Path<SubjectPath>,
    body: web::Json<BlockParams>,
    admin: web::ReqData<AdminId>,
    api: web::Data<BlockApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let subject = Subject::from(path.into_inner());
    let params = body.into_inner();
    let amount = parse_amount("required_payment", &params.required_payment)?;
    info!("💻️ Admin #{} is blocking {subject}", admin.0);
    let record = api.block(subject, &params.reason, amount, admin.0, params.until).await?;
    Ok(HttpResponse::Ok().json(record))
}

route!(unblock_subject => Delete "/blocks/{kind}/{id}" impl MarketplaceDatabase);
pub async fn unblock_subject<B: MarketplaceDatabase>(
    path: web::Path<SubjectPath>,
    admin: web::ReqData<AdminId>,
    api: web::Data<BlockApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let subject = Subject::from(path.into_inner());
    info!("💻️ Admin #{} is unblocking {subject}", admin.0);
    api.unblock(subject, admin.0).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{subject} is no longer blocked"))))
}

//----------------------------------------------   Refunds  ----------------------------------------------------
route!(refunds => Get "/refunds" impl MarketplaceDatabase);
pub async fn refunds<B: MarketplaceDatabase>(
    query: web::Query<RefundQueryParams>,
    api: web::Data<RefundApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let status = query.into_inner().status;
    debug!("💻️ GET refunds ({status:?})");
    let refunds = api.refunds(status).await?;
    Ok(HttpResponse::Ok().json(refunds))
}

route!(initiate_refund => Post "/refunds" impl MarketplaceDatabase);
/// Opens a refund for an order. The customer is then asked in the chat for a card to receive the money on.
pub async fn initiate_refund<B: MarketplaceDatabase>(
    body: web::Json<RefundParams>,
    admin: web::ReqData<AdminId>,
    api: web::Data<RefundApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    let amount = parse_amount("amount", &params.amount)?;
    let order_id = OrderId(params.order_id);
    info!("💻️ Admin #{} is refunding {amount} for order {order_id}", admin.0);
    let refund = api.initiate_refund(order_id, amount, &params.reason, admin.0).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(refund_by_id => Get "/refunds/{id}" impl MarketplaceDatabase);
pub async fn refund_by_id<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    api: web::Data<RefundApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let refund = api.refund(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(payout_card => Get "/refunds/{id}/card" impl MarketplaceDatabase);
/// Decrypts the card the customer supplied so the admin can make the transfer.
pub async fn payout_card<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    admin: web::ReqData<AdminId>,
    api: web::Data<RefundApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    info!("💻️ Admin #{} viewed the payout card for refund #{refund_id}", admin.0);
    let card: Secret<String> = api.reveal_payout_card(refund_id).await?;
    Ok(HttpResponse::Ok().json(PayoutCard { refund_id, card_number: card.reveal().clone() }))
}

route!(complete_refund => Post "/refunds/{id}/complete" impl MarketplaceDatabase);
pub async fn complete_refund<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    admin: web::ReqData<AdminId>,
    api: web::Data<RefundApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    let refund = api.complete_refund(refund_id, admin.0).await?;
    Ok(HttpResponse::Ok().json(refund))
}
