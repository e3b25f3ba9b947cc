//! Webhook hosting surface

pub mod handlers;
pub mod routes;

pub use handlers::{webhook_path, AppState, SECRET_HEADER};
pub use routes::build_webhook_routes;
