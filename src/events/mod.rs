use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::entities::OrderStatus;

/// Domain events published by the order services after their transactions
/// commit. Consumers must treat delivery as best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderDelivered {
        order_id: Uuid,
        delivery_date: DateTime<Utc>,
    },
    VoucherRedeemed {
        user_id: Uuid,
        voucher_id: Uuid,
    },
    StockDecremented {
        variant_id: Uuid,
        quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a bounded event channel with the sender already wrapped.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Processes incoming events. Runs until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "Order status changed"
                );
            }
            Event::OrderDelivered {
                order_id,
                delivery_date,
            } => {
                info!(order_id = %order_id, delivered_at = %delivery_date, "Order delivered");
            }
            Event::VoucherRedeemed { user_id, voucher_id } => {
                info!(user_id = %user_id, voucher_id = %voucher_id, "Voucher redeemed");
            }
            Event::StockDecremented {
                variant_id,
                quantity,
            } => {
                debug!(variant_id = %variant_id, quantity = quantity, "Stock decremented");
            }
        }
    }

    info!("Event processing loop terminated");
}
