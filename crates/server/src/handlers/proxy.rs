//! Proxy endpoint.

use crate::metrics::record_proxy_status;
use crate::proxy::{AccessEntry, forward};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::response::{IntoResponse, Response};
use std::time::Instant;

/// GET /v1/proxy - Scrape the target named in the query on the caller's behalf.
pub async fn proxy_scrape(State(state): State<AppState>, req: Request) -> Response {
    let started = Instant::now();
    let access = AccessEntry::from_request(&req);

    let (parts, _) = req.into_parts();

    let response = match forward(&state.http, parts.uri, parts.headers).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    let status = response.status();
    let size = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    record_proxy_status(status);
    access.log(status, size, started.elapsed());

    response
}
