//! CORS headers (§4.6 steps 2/3/10): applied to blocked-IP responses,
//! `OPTIONS` preflight responses, and every forwarded response.

use axum::http::HeaderMap;
use axum::http::HeaderValue;

pub fn apply(headers: &mut HeaderMap) {
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static(
            "Authorization, Grpc-Metadata-Macaroon, Macaroon, Content-Type, X-Grpc-Web",
        ),
    );
}
