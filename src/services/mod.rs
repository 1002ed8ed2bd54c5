pub mod order_status;
pub mod orders;

pub use order_status::OrderStatusService;
pub use orders::OrderService;
