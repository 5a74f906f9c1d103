use std::sync::Arc;

use actix_web::{
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::Utc;
use log::*;
use usta_common::Secret;
use usta_engine::{
    clock::{Clock, ManualClock},
    db_types::{Actor, Azn, GeoPoint, NewArtisan, NewCustomer, NewOrder, OrderId, PaymentMethod},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    BlockApi,
    MarketplaceDatabase,
    OrderFlowApi,
    ParticipantApi,
    PaymentVerificationApi,
    PiiCipher,
    RefundApi,
    SqliteDatabase,
};

use crate::{
    cipher::AeadPiiCipher,
    config::{AdminToken, AdminTokens},
    middleware::ADMIN_TOKEN_HEADER,
    server::configure_routes,
};

pub const ADMIN_TOKEN: &str = "admin-7-token";
pub const ADMIN_ID: i64 = 7;
const BAKU: GeoPoint = GeoPoint { latitude: 40.4093, longitude: 49.8671 };

/// A marketplace on a fresh database, wired up the way the server wires it, but with a clock the test controls.
pub struct TestSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub clock: ManualClock,
    pub cipher: Arc<dyn PiiCipher>,
}

impl TestSystem {
    pub async fn new() -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error opening test database");
        let clock = ManualClock::new(Utc::now());
        let cipher = AeadPiiCipher::new(&Secret::new("endpoint test key".to_string())).expect("Error creating cipher");
        Self { db_path, db, clock, cipher: Arc::new(cipher) }
    }

    fn shared_clock(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }

    pub fn orders(&self) -> OrderFlowApi<SqliteDatabase> {
        OrderFlowApi::new(self.db.clone(), EventProducers::default()).with_clock(self.shared_clock())
    }

    pub fn payments(&self) -> PaymentVerificationApi<SqliteDatabase> {
        PaymentVerificationApi::new(self.db.clone(), EventProducers::default()).with_clock(self.shared_clock())
    }

    pub fn blocks(&self) -> BlockApi<SqliteDatabase> {
        BlockApi::new(self.db.clone(), EventProducers::default()).with_clock(self.shared_clock())
    }

    pub fn refunds(&self) -> RefundApi<SqliteDatabase> {
        RefundApi::new(self.db.clone(), EventProducers::default(), Arc::clone(&self.cipher))
            .with_clock(self.shared_clock())
    }

    pub fn participants(&self) -> ParticipantApi<SqliteDatabase> {
        ParticipantApi::new(self.db.clone()).with_clock(self.shared_clock())
    }

    pub fn configure(&self) -> impl FnOnce(&mut ServiceConfig) + '_ {
        move |cfg| {
            cfg.app_data(web::Data::new(self.orders()))
                .app_data(web::Data::new(self.payments()))
                .app_data(web::Data::new(self.blocks()))
                .app_data(web::Data::new(self.refunds()));
            let tokens = AdminTokens::new(vec![AdminToken { admin_id: ADMIN_ID, token: Secret::new(ADMIN_TOKEN.into()) }]);
            configure_routes(cfg, tokens);
        }
    }

    pub async fn customer(&self, name: &str) -> i64 {
        let chat_id = format!("tg-{}", name.to_lowercase());
        let customer = NewCustomer::new(chat_id.as_str(), name);
        self.participants().register_customer(customer).await.expect("Error registering customer").id
    }

    pub async fn artisan(&self, name: &str) -> i64 {
        let chat_id = format!("tg-{}", name.to_lowercase());
        let artisan = NewArtisan::new(chat_id.as_str(), name, "plumber").with_location(BAKU);
        self.participants().register_artisan(artisan).await.expect("Error registering artisan").id
    }

    /// A plumbing job, accepted and priced, with a card receipt waiting in the review queue.
    pub async fn card_order_with_receipt(&self, customer_id: i64, artisan_id: i64, price: i64) -> OrderId {
        let orders = self.orders();
        let order = NewOrder::new(customer_id, "plumber").with_location(BAKU).for_artisan(artisan_id);
        let order_id = orders.create_order(order).await.expect("Error creating order").order.id;
        orders.accept_order(order_id, artisan_id).await.expect("Error accepting order");
        orders.set_price(order_id, artisan_id, Azn::from_manat(price)).await.expect("Error setting price");
        let customer = Actor::Customer(customer_id);
        orders.select_payment_method(order_id, PaymentMethod::Card, customer).await.expect("Error choosing card");
        self.payments().upload_receipt(order_id, customer, "receipt-photo-1").await.expect("Error uploading receipt");
        order_id
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        let path = self.db_path.trim_start_matches("sqlite://");
        if let Err(e) = std::fs::remove_file(path) {
            warn!("🚀️ Could not remove test database {path}: {e}");
        }
    }
}

/// Sends `req` to an app built from `system` and returns the status and body. Errors raised by middleware are turned
/// into responses the same way the HTTP server would.
pub async fn send(system: &TestSystem, req: TestRequest) -> (StatusCode, String) {
    let app = test::init_service(App::new().configure(system.configure())).await;
    match test::try_call_service(&app, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.as_response_error();
            debug!("🚀️ Request failed in middleware: {e}");
            (res.status_code(), e.to_string())
        },
    }
}

pub fn as_admin(req: TestRequest) -> TestRequest {
    req.insert_header((ADMIN_TOKEN_HEADER, ADMIN_TOKEN))
}

pub fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}
