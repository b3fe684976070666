use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::env;
use std::time::Instant;
use tracing::info;

/// Initializes tracing using the provided log level as the default filter.
///
/// `RUST_LOG`, when set and non-empty, wins over `level`.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!(
        "repairdesk_api={level},audit={level},tower_http=info,sqlx=warn",
        level = level
    );
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt().with_env_filter(EnvFilter::new(filter_directive));
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Logs method, path, status and latency of every request.
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms,
        "HTTP request handled"
    );

    response
}
