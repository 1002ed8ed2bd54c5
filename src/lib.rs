use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod services;

pub use config::AppConfig;
pub use db::DbPool;
pub use errors::ServiceError;

use events::EventSender;
use notifications::OrderNotifier;
use services::{OrderService, OrderStatusService};

/// Standard envelope for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Common pagination query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl ListQuery {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self, default: u64) -> u64 {
        self.per_page.unwrap_or(default).clamp(1, 100)
    }
}

/// The service layer, shared across handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub order_status: OrderStatusService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            orders: OrderService::new(db.clone(), event_sender.clone(), notifier),
            order_status: OrderStatusService::new(db, event_sender),
        }
    }
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        let services = AppServices::new(db.clone(), event_sender.clone(), notifier);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// Versioned API routes.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route(
            "/orders/status/:status",
            get(handlers::orders::list_orders_by_status),
        )
        .route(
            "/orders/payment-ref/:payment_ref",
            get(handlers::orders::get_order_by_payment_ref),
        )
        .route(
            "/orders/user/:user_id",
            get(handlers::orders::list_user_orders),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/details",
            get(handlers::orders::get_order_details),
        )
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/reports/total-sales", get(handlers::reports::total_sales))
        .route(
            "/reports/sales-by-category",
            get(handlers::reports::sales_by_category),
        )
}

/// Assembles the full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
