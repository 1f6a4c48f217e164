//! The reverse-proxy request pipeline (§4.6). One handler drives every
//! proxied request through: remote-IP extraction, blocklist, CORS
//! preflight, service matching, the auth-level branch, rate limiting,
//! header rewrite, upstream forwarding and, finally, CORS on the response.

use crate::app_error::is_grpc_request;
use crate::app_error::AppError;
use crate::cors;
use crate::state::AppState;
use axum::body::Body;
use axum::body::BoxBody;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use bytes::Bytes;
use http_body::Body as HttpBody;
use hyper::client::HttpConnector;
use hyper::Client;
use hyper_rustls::HttpsConnector;
use hyper_rustls::HttpsConnectorBuilder;
use l402_authenticator::accept;
use l402_authenticator::fresh_challenge;
use l402_common::service::PriceContext;
use l402_common::AuthLevel;
use l402_common::Service;
use pin_project_lite::pin_project;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context as TaskContext;
use std::task::Poll;
use std::time::Duration;

pub type UpstreamClient = Client<HttpsConnector<HttpConnector>>;

pub fn build_upstream_client() -> UpstreamClient {
    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();
    Client::builder().build(https)
}

/// Headers whose presence would let a caller forge its own auth decision
/// downstream; stripped before forwarding and re-derived by us.
const HOP_BY_HOP: &[&str] = &["connection", "keep-alive", "te", "trailers", "upgrade"];

fn remote_ip(headers: &HeaderMap, socket_addr: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').last())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(socket_addr.ip())
}

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(socket_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let is_grpc = is_grpc_request(
        request
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
    );

    match run_pipeline(&state, socket_addr, request).await {
        Ok(response) => response,
        Err(err) => err.respond(is_grpc),
    }
}

async fn run_pipeline(
    state: &Arc<AppState>,
    socket_addr: SocketAddr,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let remote = remote_ip(request.headers(), socket_addr);

    // Step 2: blocklist.
    if state.is_blocked(remote).await {
        let mut response = (StatusCode::FORBIDDEN, "access denied").into_response();
        cors::apply(response.headers_mut());
        return Ok(response);
    }

    // Step 3: OPTIONS preflight.
    if request.method() == axum::http::Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        cors::apply(response.headers_mut());
        return Ok(response);
    }

    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let path = request.uri().path().to_string();

    // Step 4: backend selection.
    let Some(service) = state.registry.match_service(&host, &path) else {
        // Step 5: no configured backend, try the proxy's own routes.
        let Some(local) = state.registry.match_local(&path) else {
            return Err(AppError::NoBackendMatched);
        };
        let mut response = local.handle(state, request).await;
        cors::apply(response.headers_mut());
        return Ok(response);
    };

    // Step 6: auth policy.
    authorize(state, service, &path, remote, request.headers()).await?;

    // Step 7: rate limiting.
    state
        .rate_limiters
        .check(&service.name, &service.rate_limits, &path)
        .map_err(AppError::RateLimited)?;

    // Steps 8-9: rewrite and forward.
    let response = forward(&state.client, service, request).await?;

    // Step 10: CORS on the response.
    let mut response = response;
    cors::apply(response.headers_mut());
    Ok(response)
}

async fn authorize(
    state: &Arc<AppState>,
    service: &Service,
    path: &str,
    remote: IpAddr,
    headers: &HeaderMap,
) -> Result<(), AppError> {
    if service.is_whitelisted(path) {
        return Ok(());
    }

    match service.auth_level {
        AuthLevel::Off => Ok(()),
        AuthLevel::Freebie(limit) => {
            if accept(&HeaderMapLookup(headers), &service.name, &state.mint).await {
                return Ok(());
            }
            if state.freebies.try_consume(&service.name, remote, limit) {
                Ok(())
            } else {
                challenge_or_pass(state, service, path, headers).await
            }
        }
        AuthLevel::On => challenge_or_pass(state, service, path, headers).await,
    }
}

async fn challenge_or_pass(
    state: &Arc<AppState>,
    service: &Service,
    path: &str,
    headers: &HeaderMap,
) -> Result<(), AppError> {
    if accept(&HeaderMapLookup(headers), &service.name, &state.mint).await {
        return Ok(());
    }

    let price = service.price_source.price_sats(&PriceContext {
        service: &service.name,
        path,
    });
    if price == 0 {
        return Ok(());
    }

    let challenge = fresh_challenge(&state.mint, std::slice::from_ref(service)).await?;
    Err(AppError::Challenge(challenge))
}

async fn forward(
    client: &UpstreamClient,
    service: &Service,
    mut request: Request<Body>,
) -> Result<Response, AppError> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = format!("{}://{}{}", service.protocol, service.address, path_and_query);
    *request.uri_mut() = uri
        .parse()
        .map_err(|e| AppError::Upstream(format!("invalid upstream uri: {e}")))?;

    let headers = request.headers_mut();
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    if let Ok(host_value) = axum::http::HeaderValue::from_str(&service.address) {
        headers.insert(axum::http::header::HOST, host_value);
    }
    for (key, value) in &service.headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::try_from(key.as_str()),
            axum::http::HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    let timeout = service.timeout.unwrap_or(Duration::from_secs(30));
    let upstream = tokio::time::timeout(timeout, client.request(request))
        .await
        .map_err(|_| AppError::Upstream("upstream request timed out".to_string()))?
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let (parts, body) = upstream.into_parts();
    let grpc_status = parts.headers.get("grpc-status").cloned();
    let grpc_message = parts.headers.get("grpc-message").cloned();
    let body = if grpc_status.is_some() {
        axum::body::boxed(GrpcTrailerFixup {
            inner: axum::body::boxed(body),
            grpc_status,
            grpc_message,
            trailers_seen: false,
        })
    } else {
        axum::body::boxed(body)
    };

    Ok(Response::from_parts(parts, body))
}

pin_project! {
    /// Copies `Grpc-Status`/`Grpc-Message` response headers into HTTP/2
    /// trailers when the upstream response carried the status in headers
    /// but sent no trailers of its own (§4.6 step 9b).
    struct GrpcTrailerFixup {
        #[pin]
        inner: BoxBody,
        grpc_status: Option<HeaderValue>,
        grpc_message: Option<HeaderValue>,
        trailers_seen: bool,
    }
}

impl http_body::Body for GrpcTrailerFixup {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        self.project().inner.poll_data(cx)
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        let this = self.project();
        match this.inner.poll_trailers(cx) {
            Poll::Ready(Ok(Some(trailers))) => {
                *this.trailers_seen = true;
                Poll::Ready(Ok(Some(trailers)))
            }
            Poll::Ready(Ok(None)) => {
                if *this.trailers_seen {
                    return Poll::Ready(Ok(None));
                }
                *this.trailers_seen = true;
                let mut trailers = HeaderMap::new();
                if let Some(status) = this.grpc_status.take() {
                    trailers.insert("grpc-status", status);
                }
                if let Some(message) = this.grpc_message.take() {
                    trailers.insert("grpc-message", message);
                }
                if trailers.is_empty() {
                    Poll::Ready(Ok(None))
                } else {
                    Poll::Ready(Ok(Some(trailers)))
                }
            }
            other => other,
        }
    }
}

/// Adapts axum's `HeaderMap` to `l402_authenticator::HeaderLookup`.
struct HeaderMapLookup<'a>(&'a HeaderMap);

impl<'a> l402_authenticator::HeaderLookup for HeaderMapLookup<'a> {
    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }
}
