pub mod chat_ws;
pub mod documents;
mod error;
pub mod health;
pub mod messages;
pub mod tiktok;
pub mod waitlist;

use axum::Router;
pub use chat_ws::{ActiveConnections, chat_ws_handler};
pub use error::ApiError;

use crate::{AppState, middleware::require_auth_middleware};

/// Everything mounted under `/api`.
pub fn get_api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .nest("/messages", messages::router())
        .nest("/tiktok", tiktok::router())
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            require_auth_middleware,
        ));

    Router::new()
        .nest("/documents", documents::router())
        .nest("/waitlist", waitlist::router())
        .merge(protected)
}
