mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::*;
use storefront_api::{entities::OrderStatus, services::orders::CheckoutLine};

async fn deliver(ctx: &TestContext, order_id: Uuid) {
    ctx.status
        .transition(order_id, OrderStatus::Confirmed)
        .await
        .unwrap();
    ctx.status
        .transition(order_id, OrderStatus::OnDelivery)
        .await
        .unwrap();
    ctx.status
        .transition(order_id, OrderStatus::Delivered)
        .await
        .unwrap();
}

#[tokio::test]
async fn total_sales_counts_only_delivered_orders() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;
    let variant = seed_catalog(&ctx.db, dec!(100), 100).await;
    let cart = seed_cart(&ctx.db, user.id).await;

    let mut order_ids = Vec::new();
    for qty in [1, 2, 3] {
        seed_cart_item(&ctx.db, cart.id, variant.id, qty).await;
        let request = checkout_request(
            payment.id,
            Decimal::ZERO,
            vec![CheckoutLine {
                variant_id: variant.id,
                quantity: qty,
            }],
        );
        order_ids.push(ctx.orders.create_order(user.id, request).await.unwrap().id);
    }

    assert_eq!(ctx.orders.total_sales().await.unwrap(), Decimal::ZERO);

    // Deliver the 100 and 300 orders; cancel the 200 one.
    deliver(&ctx, order_ids[0]).await;
    deliver(&ctx, order_ids[2]).await;
    ctx.status
        .transition(order_ids[1], OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(ctx.orders.total_sales().await.unwrap(), dec!(400));
}

#[tokio::test]
async fn sales_by_category_attributes_line_totals() {
    let ctx = setup().await;
    let user = seed_user(&ctx.db).await;
    let payment = seed_payment_method(&ctx.db, false).await;

    let shoes = seed_category(&ctx.db, "Shoes").await;
    let shirts = seed_category(&ctx.db, "Shirts").await;
    let runner = seed_product(&ctx.db, shoes.id, "Runner").await;
    let tee = seed_product(&ctx.db, shirts.id, "Tee").await;
    let runner_42 = seed_variant(&ctx.db, runner.id, "Size 42", dec!(100), 50).await;
    let tee_m = seed_variant(&ctx.db, tee.id, "Medium", dec!(25), 50).await;

    let cart = seed_cart(&ctx.db, user.id).await;
    seed_cart_item(&ctx.db, cart.id, runner_42.id, 2).await;
    seed_cart_item(&ctx.db, cart.id, tee_m.id, 4).await;

    let request = checkout_request(
        payment.id,
        dec!(15),
        vec![
            CheckoutLine {
                variant_id: runner_42.id,
                quantity: 2,
            },
            CheckoutLine {
                variant_id: tee_m.id,
                quantity: 4,
            },
        ],
    );
    let order = ctx.orders.create_order(user.id, request).await.unwrap();

    // Nothing delivered yet.
    assert!(ctx.orders.sales_by_category().await.unwrap().is_empty());

    deliver(&ctx, order.id).await;

    let sales = ctx.orders.sales_by_category().await.unwrap();
    assert_eq!(sales.len(), 2);
    assert_eq!(sales.get("Shoes"), Some(&dec!(200)));
    assert_eq!(sales.get("Shirts"), Some(&dec!(100)));

    // Shipping is part of the order total, not of any category's line totals.
    assert_eq!(ctx.orders.total_sales().await.unwrap(), dec!(315));
}
