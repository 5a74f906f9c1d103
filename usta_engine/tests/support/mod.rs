#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::sync::mpsc;
use usta_common::Secret;
use usta_engine::{
    clock::ManualClock,
    db_types::{Artisan, Azn, Customer, GeoPoint, NewArtisan, NewCustomer, NewOrder, NewPriceRange, Order, OrderId},
    events::{EventProducers, EventPublisher, NotificationEvent, NotificationKind, OrderStatusChangedEvent, Recipient},
    order_objects::DispatchOutcome,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    BlockApi,
    ConversationApi,
    MarketplaceDatabase,
    MarketplacePolicy,
    OrderFlowApi,
    ParticipantApi,
    PaymentVerificationApi,
    PiiCipher,
    PiiCipherError,
    RefundApi,
    SqliteDatabase,
};

/// Central Baku. Offsets of 0.009 degrees of latitude are roughly one kilometre.
pub const BAKU: GeoPoint = GeoPoint { latitude: 40.4093, longitude: 49.8671 };

pub fn km_north(km: f64) -> GeoPoint {
    GeoPoint::new(BAKU.latitude + km * 0.009, BAKU.longitude)
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).single().expect("valid start time")
}

/// Reversible stand-in for encryption so tests can check what was stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestCipher;

impl PiiCipher for TestCipher {
    fn encrypt(&self, plaintext: &Secret<String>) -> Result<String, PiiCipherError> {
        Ok(format!("test:{}", plaintext.reveal().chars().rev().collect::<String>()))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<Secret<String>, PiiCipherError> {
        let body = ciphertext
            .strip_prefix("test:")
            .ok_or_else(|| PiiCipherError::MalformedCiphertext(format!("not a test ciphertext: {ciphertext}")))?;
        Ok(Secret::new(body.chars().rev().collect()))
    }
}

/// Collects every event the engine publishes so tests can look at them afterwards.
#[derive(Clone)]
pub struct Inbox {
    notifications: Arc<Mutex<mpsc::Receiver<NotificationEvent>>>,
    status_changes: Arc<Mutex<mpsc::Receiver<OrderStatusChangedEvent>>>,
    seen: Arc<Mutex<Vec<NotificationEvent>>>,
    seen_status_changes: Arc<Mutex<Vec<OrderStatusChangedEvent>>>,
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Inbox")
    }
}

impl Inbox {
    pub fn new() -> (Self, EventProducers) {
        let (ntx, nrx) = mpsc::channel(1024);
        let (stx, srx) = mpsc::channel(1024);
        let producers = EventProducers {
            notification_producers: vec![EventPublisher::new(ntx)],
            status_changed_producers: vec![EventPublisher::new(stx)],
        };
        let inbox = Self {
            notifications: Arc::new(Mutex::new(nrx)),
            status_changes: Arc::new(Mutex::new(srx)),
            seen: Arc::new(Mutex::new(Vec::new())),
            seen_status_changes: Arc::new(Mutex::new(Vec::new())),
        };
        (inbox, producers)
    }

    fn collect(&self) {
        let mut rx = self.notifications.lock().unwrap();
        let mut seen = self.seen.lock().unwrap();
        while let Ok(ev) = rx.try_recv() {
            seen.push(ev);
        }
        let mut rx = self.status_changes.lock().unwrap();
        let mut seen = self.seen_status_changes.lock().unwrap();
        while let Ok(ev) = rx.try_recv() {
            seen.push(ev);
        }
    }

    pub fn all(&self) -> Vec<NotificationEvent> {
        self.collect();
        self.seen.lock().unwrap().clone()
    }

    pub fn for_recipient(&self, recipient: Recipient) -> Vec<NotificationKind> {
        self.all().into_iter().filter(|e| e.recipient == recipient).map(|e| e.kind).collect()
    }

    pub fn status_changes(&self) -> Vec<OrderStatusChangedEvent> {
        self.collect();
        self.seen_status_changes.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.collect();
        self.seen.lock().unwrap().clear();
        self.seen_status_changes.lock().unwrap().clear();
    }
}

/// A complete marketplace on a fresh database, with a clock that only moves when told to.
pub struct Marketplace {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub clock: ManualClock,
    pub inbox: Inbox,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub payments: PaymentVerificationApi<SqliteDatabase>,
    pub blocks: BlockApi<SqliteDatabase>,
    pub refunds: RefundApi<SqliteDatabase>,
    pub participants: ParticipantApi<SqliteDatabase>,
    pub conversations: ConversationApi<SqliteDatabase>,
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Marketplace ({})", self.db_path)
    }
}

impl Marketplace {
    pub async fn new() -> Self {
        Self::with_policy(MarketplacePolicy::default()).await
    }

    pub async fn with_policy(policy: MarketplacePolicy) -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error opening the test database");
        let clock = ManualClock::new(start_time());
        let shared = Arc::new(clock.clone());
        let (inbox, producers) = Inbox::new();
        let orders = OrderFlowApi::new(db.clone(), producers.clone()).with_clock(shared.clone()).with_policy(policy.clone());
        let payments =
            PaymentVerificationApi::new(db.clone(), producers.clone()).with_clock(shared.clone()).with_policy(policy.clone());
        let blocks = BlockApi::new(db.clone(), producers.clone()).with_clock(shared.clone());
        let refunds = RefundApi::new(db.clone(), producers, Arc::new(TestCipher))
            .with_clock(shared.clone())
            .with_policy(policy.clone());
        let participants = ParticipantApi::new(db.clone()).with_clock(shared.clone());
        let conversations = ConversationApi::new(db.clone(), policy.pending_action_ttl).with_clock(shared);
        Self { db_path, db, clock, inbox, orders, payments, blocks, refunds, participants, conversations }
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&self.db_path).await {
            warn!("🚀️ Could not remove test database {}: {e}", self.db_path);
        }
    }

    pub async fn customer(&self, name: &str) -> Customer {
        let chat_id = format!("tg-{}", name.to_lowercase());
        self.participants.register_customer(NewCustomer::new(chat_id.as_str(), name)).await.expect("Error registering customer")
    }

    pub async fn artisan(&self, name: &str, service: &str, location: GeoPoint) -> Artisan {
        let chat_id = format!("tg-{}", name.to_lowercase());
        let artisan = NewArtisan::new(chat_id.as_str(), name, service).with_location(location);
        self.participants.register_artisan(artisan).await.expect("Error registering artisan")
    }

    pub async fn price_range(&self, artisan_id: i64, subservice: &str, min: i64, max: i64) {
        let range = NewPriceRange {
            artisan_id,
            subservice: subservice.to_string(),
            min_price: Azn::from_manat(min),
            max_price: Azn::from_manat(max),
        };
        self.participants.declare_price_range(range).await.expect("Error declaring price range");
    }

    pub async fn request(&self, customer_id: i64, service: &str, location: GeoPoint) -> DispatchOutcome {
        let order = NewOrder::new(customer_id, service).with_location(location);
        self.orders.create_order(order).await.expect("Error creating order")
    }

    /// An order accepted and priced by `artisan_id`.
    pub async fn priced_order(&self, customer_id: i64, artisan_id: i64, price: i64) -> Order {
        let order = NewOrder::new(customer_id, "plumber").with_location(BAKU).for_artisan(artisan_id);
        let outcome = self.orders.create_order(order).await.expect("Error creating order");
        self.orders.accept_order(outcome.order.id, artisan_id).await.expect("Error accepting order");
        let priced =
            self.orders.set_price(outcome.order.id, artisan_id, Azn::from_manat(price)).await.expect("Error setting price");
        priced.order
    }

    pub async fn order(&self, id: OrderId) -> Order {
        self.orders.order(id).await.expect("Error fetching order")
    }
}
