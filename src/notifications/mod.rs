use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

/// Fully materialised order confirmation payload. Built from a single
/// eager fetch of the order graph (order, lines, variants, products) so the
/// notifier never touches the database itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub recipient_email: String,
    pub recipient_name: String,
    pub booking_date: DateTime<Utc>,
    pub consignee_name: String,
    pub address: String,
    pub lines: Vec<ConfirmationLine>,
    pub shipping_fee: Decimal,
    pub discount_value: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationLine {
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl OrderConfirmation {
    pub fn subject(&self) -> String {
        format!("Order confirmation #{}", self.order_id)
    }

    /// Renders the confirmation email body.
    pub fn body_html(&self) -> String {
        let mut rows = String::new();
        for line in &self.lines {
            rows.push_str(&format!(
                "<tr><td>{} ({})</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                line.product_name, line.variant_name, line.quantity, line.unit_price,
                line.line_total,
            ));
        }
        format!(
            "<h2>Thank you for your order, {}!</h2>\
             <p>Order #{} placed on {}.</p>\
             <p>Delivery to: {}, {}</p>\
             <table>\
             <tr><th>Item</th><th>Qty</th><th>Unit price</th><th>Subtotal</th></tr>\
             {rows}\
             </table>\
             <p>Shipping: {}</p>\
             <p>Discount: -{}</p>\
             <p><strong>Total: {}</strong></p>",
            self.recipient_name,
            self.order_id,
            self.booking_date.format("%Y-%m-%d %H:%M UTC"),
            self.consignee_name,
            self.address,
            self.shipping_fee,
            self.discount_value,
            self.total,
        )
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Mail endpoint rejected message with status {0}")]
    Rejected(u16),
}

/// Delivery boundary for order confirmations. Implementations must be safe
/// to call from a detached task; the checkout transaction has already
/// committed by the time this runs.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError>;
}

/// Delivers confirmations through a transactional-mail HTTP endpoint.
#[derive(Clone)]
pub struct HttpEmailNotifier {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

#[derive(Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    html: String,
}

impl HttpEmailNotifier {
    pub fn new(endpoint: String, from: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            endpoint,
            from,
        }
    }
}

#[async_trait]
impl OrderNotifier for HttpEmailNotifier {
    #[instrument(skip(self, confirmation), fields(order_id = %confirmation.order_id))]
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        let payload = OutboundEmail {
            from: &self.from,
            to: &confirmation.recipient_email,
            subject: confirmation.subject(),
            html: confirmation.body_html(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status().as_u16()));
        }

        info!(
            order_id = %confirmation.order_id,
            to = %confirmation.recipient_email,
            "Order confirmation email sent"
        );
        Ok(())
    }
}

/// Logs confirmations instead of delivering them. Used when no mail
/// endpoint is configured, and in tests.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = %confirmation.order_id,
            to = %confirmation.recipient_email,
            total = %confirmation.total,
            "Order confirmation (log only)"
        );
        Ok(())
    }
}
