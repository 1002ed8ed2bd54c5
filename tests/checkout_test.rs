mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use common::*;
use storefront_api::{
    entities::{CartItem, Order, OrderDetail, OrderStatus, ProductVariant, VoucherRedemption},
    errors::ServiceError,
    events::Event,
    services::orders::CheckoutLine,
};

#[tokio::test]
async fn checkout_creates_pending_order_and_decrements_stock() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 3).await;

    let request = checkout_request(
        payment.id,
        dec!(10),
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 3,
        }],
    );

    let order = ctx.orders.create_order(user.id, request).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total, dec!(310));
    assert_eq!(order.shipping_fee, dec!(10));
    assert_eq!(order.discount_value, Decimal::ZERO);
    assert!(order.delivery_date.is_none());

    let details = ctx.orders.get_order_details(order.id).await.unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].quantity, 3);
    assert_eq!(details[0].unit_price, dec!(100));
    assert_eq!(details[0].line_total, dec!(300));
    assert_eq!(details[0].product_name, "Runner");
    assert_eq!(details[0].variant_name, "Size 42");

    let stock = ProductVariant::find_by_id(variant.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 2);

    let remaining_cart = CartItem::find().all(ctx.db.as_ref()).await.unwrap();
    assert!(remaining_cart.is_empty());
}

#[tokio::test]
async fn checkout_rejects_when_stock_is_short_and_mutates_nothing() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 6).await;

    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 6,
        }],
    );

    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(id) if id == variant.id);

    let stock = ProductVariant::find_by_id(variant.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 5);

    assert!(Order::find().all(ctx.db.as_ref()).await.unwrap().is_empty());
    assert!(OrderDetail::find()
        .all(ctx.db.as_ref())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(CartItem::find().all(ctx.db.as_ref()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn checkout_consumes_only_requested_cart_lines() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let cat = seed_category(&ctx.db, "Sneakers").await;
    let product = seed_product(&ctx.db, cat.id, "Runner").await;
    let wanted = seed_variant(&ctx.db, product.id, "Size 42", dec!(100), 5).await;
    let kept = seed_variant(&ctx.db, product.id, "Size 43", dec!(110), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, wanted.id, 1).await;
    let kept_item = seed_cart_item(&ctx.db, cart.id, kept.id, 2).await;

    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: wanted.id,
            quantity: 1,
        }],
    );

    let order = ctx.orders.create_order(user.id, request).await.unwrap();
    assert_eq!(order.total, dec!(100));

    let details = ctx.orders.get_order_details(order.id).await.unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].variant_id, wanted.id);

    // The unselected line survives for a later checkout.
    let remaining = CartItem::find().all(ctx.db.as_ref()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept_item.id);

    let untouched = ProductVariant::find_by_id(kept.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.quantity, 5);
}

#[tokio::test]
async fn aborted_checkout_publishes_no_events() {
    let (ctx, mut events) =
        setup_capturing_events(std::sync::Arc::new(storefront_api::notifications::LogNotifier))
            .await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let cat = seed_category(&ctx.db, "Sneakers").await;
    let product = seed_product(&ctx.db, cat.id, "Runner").await;
    let plentiful = seed_variant(&ctx.db, product.id, "Size 42", dec!(100), 5).await;
    let scarce = seed_variant(&ctx.db, product.id, "Size 43", dec!(100), 1).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, plentiful.id, 1).await;
    seed_cart_item(&ctx.db, cart.id, scarce.id, 10).await;

    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![
            CheckoutLine {
                variant_id: plentiful.id,
                quantity: 1,
            },
            CheckoutLine {
                variant_id: scarce.id,
                quantity: 10,
            },
        ],
    );

    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(id) if id == scarce.id);

    // The first line's decrement rolled back with the transaction.
    let stock = ProductVariant::find_by_id(plentiful.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 5);

    // No event may describe work that never committed.
    assert!(events.try_recv().is_err());

    // A subsequent successful checkout publishes its events.
    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: plentiful.id,
            quantity: 1,
        }],
    );
    let order = ctx.orders.create_order(user.id, request).await.unwrap();

    assert_matches!(events.recv().await, Some(Event::OrderCreated(id)) if id == order.id);
    assert_matches!(
        events.recv().await,
        Some(Event::StockDecremented { variant_id, quantity: 1 }) if variant_id == plentiful.id
    );
}

#[tokio::test]
async fn voucher_is_exhausted_on_first_use() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 10).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 1).await;
    let voucher = seed_voucher(&ctx.db, dec!(50)).await;
    let redemption = seed_redemption(&ctx.db, user.id, voucher.id, 1).await;

    let mut request = checkout_request(
        payment.id,
        dec!(10),
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    request.discount_value = dec!(50);
    request.voucher_id = Some(voucher.id);

    let order = ctx.orders.create_order(user.id, request).await.unwrap();
    assert_eq!(order.total, dec!(60));
    assert_eq!(order.discount_value, dec!(50));

    let spent = VoucherRedemption::find_by_id(redemption.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(spent.remaining_uses, 0);

    // Second attempt with the same voucher fails.
    seed_cart_item(&ctx.db, cart.id, variant.id, 1).await;
    let mut request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    request.discount_value = dec!(50);
    request.voucher_id = Some(voucher.id);

    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(msg) if msg.contains("already been used"));
}

#[tokio::test]
async fn checkout_requires_a_non_empty_cart() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;

    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );

    // No cart row at all.
    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(msg) if msg.contains("empty"));

    // A cart with no items behaves the same.
    seed_cart(&ctx.db, user.id).await;
    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(msg) if msg.contains("empty"));
}

#[tokio::test]
async fn checkout_rejects_unknown_user_and_payment_method() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 1).await;

    let request = checkout_request(
        Uuid::new_v4(),
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    let err = ctx
        .orders
        .create_order(Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(msg) if msg.contains("User"));

    let request = checkout_request(
        Uuid::new_v4(),
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(msg) if msg.contains("Payment method"));
}

#[tokio::test]
async fn checkout_rejects_invalid_requests() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 1).await;

    let mut request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    request.consignee_name = String::new();
    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let mut request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    request.discount_value = dec!(-5);
    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    // Request lines naming no cart line leave nothing to buy.
    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: Uuid::new_v4(),
            quantity: 1,
        }],
    );
    let err = ctx.orders.create_order(user.id, request).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(msg) if msg.contains("No valid order lines"));
}

#[tokio::test]
async fn payment_ref_lookup_finds_the_order() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 1).await;

    let mut request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );
    request.payment_ref = Some("TXN-20260830-0001".to_string());

    let order = ctx.orders.create_order(user.id, request).await.unwrap();

    let found = ctx
        .orders
        .find_by_payment_ref("TXN-20260830-0001")
        .await
        .unwrap();
    assert_eq!(found.map(|o| o.id), Some(order.id));

    let missing = ctx.orders.find_by_payment_ref("TXN-UNKNOWN").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn immediate_settlement_dispatches_a_confirmation() {
    let (notifier, mut rx) = RecordingNotifier::new();
    let ctx = setup_with_notifier(notifier).await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, true).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 2).await;

    let request = checkout_request(
        payment.id,
        dec!(10),
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 2,
        }],
    );

    let order = ctx.orders.create_order(user.id, request).await.unwrap();

    let confirmation = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no confirmation dispatched")
        .expect("notifier channel closed");
    assert_eq!(confirmation.order_id, order.id);
    assert_eq!(confirmation.recipient_email, "buyer@example.com");
    assert_eq!(confirmation.total, dec!(210));
    assert_eq!(confirmation.lines.len(), 1);
    assert_eq!(confirmation.lines[0].quantity, 2);
}

#[tokio::test]
async fn deferred_settlement_sends_no_confirmation() {
    let (notifier, mut rx) = RecordingNotifier::new();
    let ctx = setup_with_notifier(notifier).await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 5).await;
    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, variant.id, 1).await;

    let request = checkout_request(
        payment.id,
        Decimal::ZERO,
        vec![CheckoutLine {
            variant_id: variant.id,
            quantity: 1,
        }],
    );

    ctx.orders.create_order(user.id, request).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(outcome.is_err(), "no email expected for deferred settlement");
}
