use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        cart, cart_item, order, order_detail, product, product_variant, user,
        voucher_redemption, Cart, CartItem, Category, Order, OrderDetail, OrderStatus,
        PaymentMethod, Product, ProductVariant, User, VoucherRedemption,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{ConfirmationLine, OrderConfirmation, OrderNotifier},
};

/// One requested line of a checkout: which cart variant to buy and how many.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutLine {
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

/// Checkout request converting selected cart lines into an order.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Consignee name is required"))]
    pub consignee_name: String,
    #[validate(length(min = 1, message = "Consignee phone is required"))]
    pub consignee_phone: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    pub order_notes: Option<String>,
    #[serde(default)]
    pub shipping_fee: Decimal,
    #[serde(default)]
    pub discount_value: Decimal,
    pub voucher_id: Option<Uuid>,
    pub payment_method_id: Uuid,
    pub payment_ref: Option<String>,
    #[validate]
    pub lines: Vec<CheckoutLine>,
}

/// One order line joined with its product information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetailResponse {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// A page of orders, newest booking first.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderPage {
    pub items: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

/// Service owning the checkout transaction and the order read side.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: Arc<dyn OrderNotifier>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    /// Converts the selected cart lines of `user_id` into a persisted order.
    ///
    /// Runs as a single database transaction: stock decrement, voucher
    /// exhaustion, order persistence and cart cleanup either all apply or
    /// none do. The confirmation email is dispatched on a detached task
    /// after commit and can never affect the transaction's outcome.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<order::Model, ServiceError> {
        request.validate()?;
        if request.shipping_fee < Decimal::ZERO || request.discount_value < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Shipping fee and discount must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start checkout transaction");
            ServiceError::DatabaseError(e)
        })?;

        let user = User::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InvalidInput("Cart is empty".to_string()))?;

        let cart_items = cart.find_related(CartItem).all(&txn).await?;
        if cart_items.is_empty() {
            return Err(ServiceError::InvalidInput("Cart is empty".to_string()));
        }

        if request.lines.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Order lines must not be empty".to_string(),
            ));
        }

        let payment = PaymentMethod::find_by_id(request.payment_method_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Payment method {} not found",
                    request.payment_method_id
                ))
            })?;

        let requested_variant_ids: Vec<Uuid> =
            request.lines.iter().map(|line| line.variant_id).collect();

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let mut subtotal = Decimal::ZERO;
        let mut pending_details: Vec<order_detail::ActiveModel> = Vec::new();
        let mut consumed_item_ids: Vec<Uuid> = Vec::new();
        // Events for in-transaction mutations are held back until commit;
        // an abort must leave no trace of rolled-back work.
        let mut pending_events: Vec<Event> = Vec::new();

        // Only cart lines named by the request are consumed; the rest of
        // the cart survives the checkout untouched.
        for item in &cart_items {
            if !requested_variant_ids.contains(&item.variant_id) {
                continue;
            }

            let line = request
                .lines
                .iter()
                .find(|line| line.variant_id == item.variant_id)
                .ok_or_else(|| {
                    ServiceError::InvalidInput(format!(
                        "No order line found for product variant {}",
                        item.variant_id
                    ))
                })?;

            let variant = ProductVariant::find_by_id(item.variant_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Product variant {} not found",
                        item.variant_id
                    ))
                })?;

            if variant.quantity < line.quantity {
                return Err(ServiceError::InsufficientStock(variant.id));
            }

            self.decrement_stock(&txn, variant.id, line.quantity).await?;
            pending_events.push(Event::StockDecremented {
                variant_id: variant.id,
                quantity: line.quantity,
            });

            // Unit price is frozen from the live variant price at this
            // moment; later price changes never touch the order.
            let line_total = variant.price * Decimal::from(line.quantity);
            subtotal += line_total;
            pending_details.push(order_detail::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(variant.id),
                quantity: Set(line.quantity),
                unit_price: Set(variant.price),
                line_total: Set(line_total),
            });
            consumed_item_ids.push(item.id);
        }

        if pending_details.is_empty() {
            return Err(ServiceError::InvalidInput(
                "No valid order lines in request".to_string(),
            ));
        }

        if request.discount_value > Decimal::ZERO {
            if let Some(voucher_id) = request.voucher_id {
                self.redeem_voucher(&txn, user_id, voucher_id).await?;
                pending_events.push(Event::VoucherRedeemed {
                    user_id,
                    voucher_id,
                });
            }
        }

        let total = subtotal + request.shipping_fee - request.discount_value;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            booking_date: Set(now),
            delivery_date: Set(None),
            consignee_name: Set(request.consignee_name.clone()),
            consignee_phone: Set(request.consignee_phone.clone()),
            address: Set(request.address.clone()),
            order_notes: Set(request.order_notes.clone()),
            shipping_fee: Set(request.shipping_fee),
            discount_value: Set(request.discount_value),
            total: Set(total),
            status: Set(OrderStatus::Pending),
            payment_method_id: Set(payment.id),
            payment_ref: Set(request.payment_ref.clone()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        OrderDetail::insert_many(pending_details).exec(&txn).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::Id.is_in(consumed_item_ids))
            .exec(&txn)
            .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit checkout transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            user_id = %user_id,
            total = %order_model.total,
            "Order created"
        );

        self.publish(Event::OrderCreated(order_id)).await;
        for event in pending_events {
            self.publish(event).await;
        }

        // Immediately-settling payment methods (cash on delivery and the
        // like) confirm at checkout; gateway-backed methods confirm from
        // their payment callback instead.
        if payment.settles_immediately {
            self.dispatch_confirmation(&order_model, &user).await;
        }

        Ok(order_model)
    }

    /// Conditional stock decrement. Two checkouts racing for the last unit
    /// serialize at the row store: whichever update matches zero rows loses
    /// and the whole transaction aborts.
    async fn decrement_stock(
        &self,
        txn: &DatabaseTransaction,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Quantity,
                Expr::col(product_variant::Column::Quantity).sub(quantity),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::Quantity.gte(quantity))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(variant_id));
        }
        Ok(())
    }

    /// Best-effort event publish; only used after the owning transaction
    /// has committed.
    async fn publish(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to publish event");
        }
    }

    /// Exhausts the user's saved voucher. Remaining uses drop straight to
    /// zero on redemption, matching the one-shot voucher model.
    async fn redeem_voucher(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        voucher_id: Uuid,
    ) -> Result<(), ServiceError> {
        let redemption = VoucherRedemption::find()
            .filter(voucher_redemption::Column::UserId.eq(user_id))
            .filter(voucher_redemption::Column::VoucherId.eq(voucher_id))
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No saved voucher {} for user {}",
                    voucher_id, user_id
                ))
            })?;

        if redemption.remaining_uses == 0 {
            return Err(ServiceError::InvalidInput(
                "Voucher has already been used".to_string(),
            ));
        }

        let mut active: voucher_redemption::ActiveModel = redemption.into();
        active.remaining_uses = Set(0);
        active.update(txn).await?;
        Ok(())
    }

    /// Builds the confirmation payload with one eager fetch of the order
    /// graph and hands it to the notifier on a detached task. Failures are
    /// logged; checkout has already committed.
    async fn dispatch_confirmation(&self, order: &order::Model, user: &user::Model) {
        let confirmation = match self.load_confirmation(order, user).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                error!(
                    error = %e,
                    order_id = %order.id,
                    "Failed to load order graph for confirmation email"
                );
                return;
            }
        };

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let order_id = confirmation.order_id;
            if let Err(e) = notifier.send_order_confirmation(&confirmation).await {
                error!(error = %e, order_id = %order_id, "Failed to send order confirmation email");
            }
        });
    }

    async fn load_confirmation(
        &self,
        order: &order::Model,
        user: &user::Model,
    ) -> Result<OrderConfirmation, ServiceError> {
        let details = self.load_details_with_products(order.id).await?;
        let lines = details
            .into_iter()
            .map(|detail| ConfirmationLine {
                product_name: detail.product_name,
                variant_name: detail.variant_name,
                quantity: detail.quantity,
                unit_price: detail.unit_price,
                line_total: detail.line_total,
            })
            .collect();

        Ok(OrderConfirmation {
            order_id: order.id,
            recipient_email: user.email.clone(),
            recipient_name: user.username.clone(),
            booking_date: order.booking_date,
            consignee_name: order.consignee_name.clone(),
            address: order.address.clone(),
            lines,
            shipping_fee: order.shipping_fee,
            discount_value: order.discount_value,
            total: order.total,
        })
    }

    /// Fetches an order by id.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Payment-callback reconciliation lookup by external correlation token.
    pub async fn find_by_payment_ref(
        &self,
        payment_ref: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::PaymentRef.eq(payment_ref))
            .one(&*self.db)
            .await?)
    }

    /// Lists all orders, newest booking first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, page: u64, per_page: u64) -> Result<OrderPage, ServiceError> {
        self.paginate(Order::find(), page, per_page).await
    }

    /// Lists orders in a given status.
    #[instrument(skip(self))]
    pub async fn list_orders_by_status(
        &self,
        status: OrderStatus,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        self.paginate(
            Order::find().filter(order::Column::Status.eq(status)),
            page,
            per_page,
        )
        .await
    }

    /// Lists a user's orders.
    #[instrument(skip(self))]
    pub async fn list_user_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        self.paginate(
            Order::find().filter(order::Column::UserId.eq(user_id)),
            page,
            per_page,
        )
        .await
    }

    /// Lists a user's orders in a given status.
    #[instrument(skip(self))]
    pub async fn list_user_orders_by_status(
        &self,
        user_id: Uuid,
        status: OrderStatus,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        self.paginate(
            Order::find()
                .filter(order::Column::UserId.eq(user_id))
                .filter(order::Column::Status.eq(status)),
            page,
            per_page,
        )
        .await
    }

    async fn paginate(
        &self,
        query: sea_orm::Select<Order>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let paginator = query
            .order_by_desc(order::Column::BookingDate)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;
        let total_pages = total.div_ceil(per_page);

        Ok(OrderPage {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// Order lines joined with variant and product names.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order_details(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderDetailResponse>, ServiceError> {
        self.load_details_with_products(order_id).await
    }

    async fn load_details_with_products(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderDetailResponse>, ServiceError> {
        let rows = OrderDetail::find()
            .filter(order_detail::Column::OrderId.eq(order_id))
            .find_also_related(ProductVariant)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|(_, variant)| variant.as_ref().map(|v| v.product_id))
            .collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut responses = Vec::with_capacity(rows.len());
        for (detail, variant) in rows {
            let Some(variant) = variant else {
                warn!(
                    detail_id = %detail.id,
                    "Order detail references a missing product variant"
                );
                continue;
            };
            let product_name = products
                .get(&variant.product_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            responses.push(OrderDetailResponse {
                id: detail.id,
                variant_id: detail.variant_id,
                product_name,
                variant_name: variant.name,
                quantity: detail.quantity,
                unit_price: detail.unit_price,
                line_total: detail.line_total,
            });
        }
        Ok(responses)
    }

    /// Sum of totals over delivered orders.
    #[instrument(skip(self))]
    pub async fn total_sales(&self) -> Result<Decimal, ServiceError> {
        let delivered = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .all(&*self.db)
            .await?;

        Ok(delivered
            .iter()
            .fold(Decimal::ZERO, |acc, order| acc + order.total))
    }

    /// Delivered line subtotals attributed to category name. Categories
    /// sharing a name sum together; there is no id disambiguation.
    #[instrument(skip(self))]
    pub async fn sales_by_category(&self) -> Result<HashMap<String, Decimal>, ServiceError> {
        let delivered_ids: Vec<Uuid> = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|order| order.id)
            .collect();

        let mut sales: HashMap<String, Decimal> = HashMap::new();
        if delivered_ids.is_empty() {
            return Ok(sales);
        }

        let rows = OrderDetail::find()
            .filter(order_detail::Column::OrderId.is_in(delivered_ids))
            .find_also_related(ProductVariant)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|(_, variant)| variant.as_ref().map(|v| v.product_id))
            .collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let category_ids: Vec<Uuid> = products.values().map(|p| p.category_id).collect();
        let categories: HashMap<Uuid, String> = Category::find()
            .filter(crate::entities::category::Column::Id.is_in(category_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        for (detail, variant) in rows {
            let Some(variant) = variant else { continue };
            let Some(product) = products.get(&variant.product_id) else {
                continue;
            };
            let Some(category_name) = categories.get(&product.category_id) else {
                warn!(product_id = %product.id, "Product references a missing category");
                continue;
            };
            *sales.entry(category_name.clone()).or_insert(Decimal::ZERO) += detail.line_total;
        }

        Ok(sales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn checkout_request_validation() {
        let request = CreateOrderRequest {
            consignee_name: String::new(),
            consignee_phone: "555-0100".into(),
            address: "12 Elm Street".into(),
            order_notes: None,
            shipping_fee: dec!(10),
            discount_value: Decimal::ZERO,
            voucher_id: None,
            payment_method_id: Uuid::new_v4(),
            payment_ref: None,
            lines: vec![CheckoutLine {
                variant_id: Uuid::new_v4(),
                quantity: 1,
            }],
        };
        assert!(request.validate().is_err());

        let request = CreateOrderRequest {
            consignee_name: "A. Buyer".into(),
            ..request
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn line_quantity_must_be_positive() {
        let line = CheckoutLine {
            variant_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(line.validate().is_err());

        let line = CheckoutLine { quantity: 1, ..line };
        assert!(line.validate().is_ok());
    }
}
