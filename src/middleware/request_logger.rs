use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Log each request on arrival and its status once the response is ready.
pub async fn request_logger_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    tracing::info!(%method, %path, "Incoming request");

    let response = next.run(req).await;
    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        tracing::warn!(%method, %path, status, duration_ms, "Response sent");
    } else {
        tracing::info!(%method, %path, status, duration_ms, "Response sent");
    }
    response
}
