//! Credential-indirection scrape proxy.
//!
//! Discovery points credentialed targets at this endpoint. The query string
//! names the real destination (`schema`, `host`, `port`, `path`) and carries
//! the credential (`bearer` or base64 `base`). Everything else in the query is
//! forwarded to the upstream untouched.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{PROXY_DURATION, PROXY_UPSTREAM_ERRORS};
use axum::body::Body;
use axum::extract::{ConnectInfo, Query, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, HOST, REFERER, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri, Version};
use axum::response::Response;
use futures::TryStreamExt;
use percent_encoding::percent_decode_str;
use promhub_core::Scheme;
use reqwest::Url;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Query parameters consumed by the proxy itself.
pub const CONTROL_PARAMS: [&str; 6] = ["schema", "host", "port", "base", "bearer", "path"];

/// Tracing target of the access log.
pub const ACCESS_LOG_TARGET: &str = "promhub::access";

/// Connection-scoped headers that are never forwarded in either direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// A validated upstream scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub url: Url,
    /// Complete `Authorization` header value, if a credential was supplied.
    pub authorization: Option<String>,
}

impl UpstreamRequest {
    /// Validate the control parameters and build the upstream URL.
    ///
    /// Nothing here touches the network; a malformed query fails before any
    /// connection is attempted.
    pub fn from_query(query: &[(String, String)]) -> ApiResult<Self> {
        let get = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .filter(|v| !v.is_empty())
        };

        let (Some(schema), Some(host), Some(port)) = (get("schema"), get("host"), get("port"))
        else {
            return Err(ApiError::BadRequest(
                "schema, host, port are required".to_string(),
            ));
        };

        let scheme = match schema {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            _ => {
                return Err(ApiError::BadRequest(
                    "invalid schema; only 'http' and 'https' are allowed".to_string(),
                ));
            }
        };

        if host
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@' | ':'))
        {
            return Err(ApiError::BadRequest(format!("invalid host '{host}'")));
        }

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                ApiError::BadRequest(
                    "invalid port; must be a number between 1 and 65535".to_string(),
                )
            })?;

        let path = match get("path") {
            Some(raw) => {
                let decoded = percent_decode_str(raw)
                    .decode_utf8()
                    .map_err(|e| ApiError::BadRequest(format!("invalid path: {e}")))?;
                if decoded.starts_with('/') {
                    decoded.into_owned()
                } else {
                    format!("/{decoded}")
                }
            }
            None => "/".to_string(),
        };

        let authority = if port == scheme.default_port() {
            host.to_string()
        } else {
            format!("{host}:{port}")
        };
        let mut url = Url::parse(&format!("{scheme}://{authority}/"))
            .map_err(|e| ApiError::BadRequest(format!("invalid target URL: {e}")))?;
        url.set_path(&path);

        let forwarded = query
            .iter()
            .filter(|(k, _)| !CONTROL_PARAMS.contains(&k.as_str()))
            .collect::<Vec<_>>();
        if !forwarded.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(forwarded.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let authorization = match (get("base"), get("bearer")) {
            (Some(base), _) => Some(format!("Basic {base}")),
            (None, Some(bearer)) => Some(format!("Bearer {bearer}")),
            (None, None) => None,
        };

        Ok(Self { url, authorization })
    }
}

/// Perform the upstream scrape and stream its response back.
///
/// Takes the inbound URI and headers by value so the request body never
/// lives across the upstream round-trip.
pub async fn forward(
    client: &reqwest::Client,
    uri: Uri,
    inbound: HeaderMap,
) -> ApiResult<Response> {
    let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(&uri)
        .map_err(|e| ApiError::BadRequest(format!("invalid query: {e}")))?;
    let upstream = UpstreamRequest::from_query(&query)?;
    tracing::debug!(url = %upstream.url, "Proxying scrape");

    let mut headers = HeaderMap::new();
    for (name, value) in inbound.iter() {
        if is_hop_by_hop(name) || *name == HOST || *name == AUTHORIZATION || *name == CONTENT_LENGTH
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let mut builder = client.get(upstream.url.clone()).headers(headers);
    if let Some(authorization) = &upstream.authorization {
        builder = builder.header(AUTHORIZATION, authorization);
    }

    let started = Instant::now();
    let upstream_response = builder
        .send()
        .await
        .map_err(|e| upstream_error(&upstream.url, e))?;
    PROXY_DURATION.observe(started.elapsed().as_secs_f64());

    let status = upstream_response.status();
    if !status.is_success() {
        tracing::warn!(
            url = %upstream.url,
            status = status.as_u16(),
            "Upstream returned non-success status"
        );
    }

    let mut response = Response::builder().status(status);
    if let Some(response_headers) = response.headers_mut() {
        for (name, value) in upstream_response.headers() {
            if !is_hop_by_hop(name) {
                response_headers.append(name.clone(), value.clone());
            }
        }
    }

    let url = upstream.url.clone();
    let stream = upstream_response.bytes_stream().inspect_err(move |e| {
        tracing::warn!(url = %url, error = %e, "Upstream body stream failed");
    });

    response
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(format!("failed to build proxy response: {e}")))
}

fn upstream_error(url: &Url, error: reqwest::Error) -> ApiError {
    PROXY_UPSTREAM_ERRORS.inc();
    if error.is_timeout() {
        tracing::error!(url = %url, error = %error, "Upstream scrape timed out");
        ApiError::UpstreamTimeout(url.to_string())
    } else {
        tracing::error!(url = %url, error = %error, "Upstream scrape failed");
        ApiError::UpstreamConnect(format!("{url}: {error}"))
    }
}

/// Request fields captured up front for the access log.
#[derive(Debug, Clone)]
pub struct AccessEntry {
    pub client_ip: String,
    pub method: Method,
    pub uri: String,
    pub protocol: Version,
    pub referrer: String,
    pub user_agent: String,
}

impl AccessEntry {
    pub fn from_request(req: &Request) -> Self {
        let header = |name: HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        Self {
            client_ip: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
                .unwrap_or_else(|| "-".to_string()),
            method: req.method().clone(),
            uri: redact_credentials(&req.uri().to_string()),
            protocol: req.version(),
            referrer: header(REFERER),
            user_agent: header(USER_AGENT),
        }
    }

    /// Emit one access-log event.
    pub fn log(&self, status: StatusCode, size: Option<u64>, latency: Duration) {
        let size = size.map_or_else(|| "-".to_string(), |s| s.to_string());
        let latency_ms = latency.as_secs_f64() * 1000.0;
        tracing::info!(
            target: ACCESS_LOG_TARGET,
            client_ip = %self.client_ip,
            method = %self.method,
            uri = %self.uri,
            protocol = ?self.protocol,
            status = status.as_u16(),
            size = %size,
            referrer = %self.referrer,
            user_agent = %self.user_agent,
            latency_ms = latency_ms,
            "{} - - \"{} {} {:?}\" {} {} \"{}\" \"{}\" {:.3}ms",
            self.client_ip,
            self.method,
            self.uri,
            self.protocol,
            status.as_u16(),
            size,
            self.referrer,
            self.user_agent,
            latency_ms,
        );
    }
}

/// Mask `bearer` and `base` values in a request URI.
pub fn redact_credentials(uri: &str) -> String {
    let Some((path, query)) = uri.split_once('?') else {
        return uri.to_string();
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == "bearer" || key == "base" => format!("{key}=REDACTED"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}
