use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, web::ServiceConfig, App, HttpServer};
use log::*;
use usta_engine::{
    events::{EventHandlers, EventProducers},
    BlockApi,
    OrderFlowApi,
    PaymentVerificationApi,
    PiiCipher,
    run_migrations,
    RefundApi,
    SqliteDatabase,
};

use crate::{
    cipher::AeadPiiCipher,
    config::{AdminTokens, ServerConfig},
    errors::ServerError,
    escalation_worker::start_escalation_worker,
    middleware::AdminAuthMiddlewareFactory,
    notifier::notification_hooks,
    routes::{
        health,
        ApproveReceiptRoute,
        BlockStatusRoute,
        BlockSubjectRoute,
        CompleteRefundRoute,
        InitiateRefundRoute,
        OrderByIdRoute,
        OverrideOrderRoute,
        PayoutCardRoute,
        ReceiptQueueRoute,
        RefundByIdRoute,
        RefundsRoute,
        RejectReceiptRoute,
        RunEscalationsRoute,
        UnblockSubjectRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 128;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    run_migrations(&config.database_url).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();
    let _worker =
        start_escalation_worker(db.clone(), producers.clone(), config.policy.clone(), config.escalation_interval);
    let srv = create_server_instance(config, db, producers)?;
    Ok(srv.await?)
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let cipher: Arc<dyn PiiCipher> =
        Arc::new(AeadPiiCipher::new(&config.pii_key).map_err(|e| ServerError::ConfigurationError(e.to_string()))?);
    let srv = HttpServer::new(move || {
        let policy = config.policy.clone();
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone()).with_policy(policy.clone());
        let payments_api = PaymentVerificationApi::new(db.clone(), producers.clone()).with_policy(policy.clone());
        let blocks_api = BlockApi::new(db.clone(), producers.clone());
        let refunds_api = RefundApi::new(db.clone(), producers.clone(), Arc::clone(&cipher)).with_policy(policy);
        let tokens = config.admin_tokens.clone();
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("usta::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(blocks_api))
            .app_data(web::Data::new(refunds_api))
            .configure(|cfg| configure_routes(cfg, tokens))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("🚀️ Admin API is listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// Registers the health check and the token-guarded `/admin` scope. The engine APIs must already be in the app data.
pub fn configure_routes(cfg: &mut ServiceConfig, tokens: AdminTokens) {
    let admin_scope = web::scope("/admin")
        .wrap(AdminAuthMiddlewareFactory::new(tokens))
        .service(ReceiptQueueRoute::<SqliteDatabase>::new())
        .service(ApproveReceiptRoute::<SqliteDatabase>::new())
        .service(RejectReceiptRoute::<SqliteDatabase>::new())
        .service(RunEscalationsRoute::<SqliteDatabase>::new())
        .service(OrderByIdRoute::<SqliteDatabase>::new())
        .service(OverrideOrderRoute::<SqliteDatabase>::new())
        .service(BlockStatusRoute::<SqliteDatabase>::new())
        .service(BlockSubjectRoute::<SqliteDatabase>::new())
        .service(UnblockSubjectRoute::<SqliteDatabase>::new())
        .service(RefundsRoute::<SqliteDatabase>::new())
        .service(InitiateRefundRoute::<SqliteDatabase>::new())
        .service(RefundByIdRoute::<SqliteDatabase>::new())
        .service(PayoutCardRoute::<SqliteDatabase>::new())
        .service(CompleteRefundRoute::<SqliteDatabase>::new());
    cfg.service(health).service(admin_scope);
}
