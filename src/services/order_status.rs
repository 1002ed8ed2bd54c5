use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{order, Order, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Drives an order through its lifecycle state machine.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Moves an order to `target` if the state machine allows it.
    ///
    /// Reaching `Delivered` stamps the delivery date. Terminal orders
    /// never change again.
    #[instrument(skip(self), fields(order_id = %order_id, target = %target))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start status transition transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let current = order.status;
        Self::validate_transition(current, target)?;

        let now = Utc::now();
        let mut active: order::ActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(Some(now));
        if target == OrderStatus::Delivered {
            active.delivery_date = Set(Some(now));
        }
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            order_id = %order_id,
            from = %current,
            to = %target,
            "Order status changed"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: current,
                new_status: target,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to publish status event");
        }
        if target == OrderStatus::Delivered {
            if let Some(delivery_date) = updated.delivery_date {
                if let Err(e) = self
                    .event_sender
                    .send(Event::OrderDelivered {
                        order_id,
                        delivery_date,
                    })
                    .await
                {
                    warn!(error = %e, order_id = %order_id, "Failed to publish delivery event");
                }
            }
        }

        Ok(updated)
    }

    /// Current status of an order.
    pub async fn get_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        Ok(order.status)
    }

    fn validate_transition(current: OrderStatus, target: OrderStatus) -> Result<(), ServiceError> {
        if current.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is finalized in status {} and cannot change",
                current
            )));
        }
        if !current.can_transition_to(target) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition order from {} to {}",
                current, target
            )));
        }
        Ok(())
    }
}
