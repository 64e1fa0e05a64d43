mod auth;
mod request_id;
mod request_logger;

pub use auth::require_auth_middleware;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use request_logger::request_logger_middleware;
