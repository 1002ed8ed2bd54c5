#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::{
    entities::{
        cart, cart_item, category, payment_method, product, product_variant, user, voucher,
        voucher_redemption,
    },
    events,
    migrator::Migrator,
    notifications::{LogNotifier, NotificationError, OrderConfirmation, OrderNotifier},
    services::{
        orders::{CheckoutLine, CreateOrderRequest},
        OrderService, OrderStatusService,
    },
};

/// Test fixture wiring the service layer against a fresh in-memory store.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub orders: OrderService,
    pub status: OrderStatusService,
}

pub async fn setup() -> TestContext {
    setup_with_notifier(Arc::new(LogNotifier)).await
}

pub async fn setup_with_notifier(notifier: Arc<dyn OrderNotifier>) -> TestContext {
    let (ctx, rx) = setup_capturing_events(notifier).await;
    tokio::spawn(events::process_events(rx));
    ctx
}

/// Like `setup`, but hands the event receiver back so tests can assert on
/// exactly which events were published.
pub async fn setup_capturing_events(
    notifier: Arc<dyn OrderNotifier>,
) -> (TestContext, mpsc::Receiver<events::Event>) {
    // A single connection keeps every query on the same in-memory store.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Arc::new(
        Database::connect(options)
            .await
            .expect("failed to open in-memory database"),
    );
    Migrator::up(db.as_ref(), None)
        .await
        .expect("failed to run migrations");

    let (event_sender, event_receiver) = events::channel(64);

    let ctx = TestContext {
        orders: OrderService::new(db.clone(), event_sender.clone(), notifier),
        status: OrderStatusService::new(db.clone(), event_sender),
        db,
    };
    (ctx, event_receiver)
}

/// Notifier that forwards every confirmation to a channel so tests can
/// assert on post-commit email dispatch.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<OrderConfirmation>,
}

impl RecordingNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OrderConfirmation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        let _ = self.tx.send(confirmation.clone());
        Ok(())
    }
}

pub async fn seed_user(db: &DatabaseConnection) -> user::Model {
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set("testbuyer".to_string()),
        email: Set("buyer@example.com".to_string()),
        phone: Set(Some("555-0100".to_string())),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed user")
}

pub async fn seed_payment_method(
    db: &DatabaseConnection,
    settles_immediately: bool,
) -> payment_method::Model {
    let name = if settles_immediately {
        "Cash on delivery"
    } else {
        "Card gateway"
    };
    payment_method::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        settles_immediately: Set(settles_immediately),
    }
    .insert(db)
    .await
    .expect("failed to seed payment method")
}

pub async fn seed_category(db: &DatabaseConnection, name: &str) -> category::Model {
    category::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await
    .expect("failed to seed category")
}

pub async fn seed_product(
    db: &DatabaseConnection,
    category_id: Uuid,
    name: &str,
) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(category_id),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}

pub async fn seed_variant(
    db: &DatabaseConnection,
    product_id: Uuid,
    name: &str,
    price: Decimal,
    quantity: i32,
) -> product_variant::Model {
    product_variant::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        name: Set(name.to_string()),
        price: Set(price),
        quantity: Set(quantity),
    }
    .insert(db)
    .await
    .expect("failed to seed variant")
}

/// Category, product and a single variant in one call.
pub async fn seed_catalog(
    db: &DatabaseConnection,
    price: Decimal,
    stock: i32,
) -> product_variant::Model {
    let cat = seed_category(db, "Sneakers").await;
    let product = seed_product(db, cat.id, "Runner").await;
    seed_variant(db, product.id, "Size 42", price, stock).await
}

pub async fn seed_cart(db: &DatabaseConnection, user_id: Uuid) -> cart::Model {
    cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
    }
    .insert(db)
    .await
    .expect("failed to seed cart")
}

pub async fn seed_cart_item(
    db: &DatabaseConnection,
    cart_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
) -> cart_item::Model {
    cart_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        cart_id: Set(cart_id),
        variant_id: Set(variant_id),
        quantity: Set(quantity),
    }
    .insert(db)
    .await
    .expect("failed to seed cart item")
}

pub async fn seed_voucher(db: &DatabaseConnection, discount: Decimal) -> voucher::Model {
    voucher::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(format!("SAVE-{}", Uuid::new_v4().simple())),
        discount: Set(discount),
    }
    .insert(db)
    .await
    .expect("failed to seed voucher")
}

pub async fn seed_redemption(
    db: &DatabaseConnection,
    user_id: Uuid,
    voucher_id: Uuid,
    remaining_uses: i32,
) -> voucher_redemption::Model {
    voucher_redemption::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        voucher_id: Set(voucher_id),
        remaining_uses: Set(remaining_uses),
    }
    .insert(db)
    .await
    .expect("failed to seed voucher redemption")
}

/// Minimal well-formed checkout request for the given lines.
pub fn checkout_request(
    payment_method_id: Uuid,
    shipping_fee: Decimal,
    lines: Vec<CheckoutLine>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        consignee_name: "A. Buyer".to_string(),
        consignee_phone: "555-0100".to_string(),
        address: "12 Elm Street".to_string(),
        order_notes: None,
        shipping_fee,
        discount_value: Decimal::ZERO,
        voucher_id: None,
        payment_method_id,
        payment_ref: None,
        lines,
    }
}
