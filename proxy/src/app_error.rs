//! Error taxonomy → HTTP/gRPC response mapping (§7). Every engine stage
//! returns an [`AppError`]; the content-type of the originating request
//! decides whether the caller sees a REST status or a gRPC-over-HTTP/200
//! trailer pair (§4.6 "Direct-response shape").

use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use l402_authenticator::ChallengeHeaders;
use l402_hashmail::HashmailError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    L402(#[from] l402_common::L402Error),

    #[error(transparent)]
    Hashmail(#[from] HashmailError),

    #[error("no backend matched this request")]
    NoBackendMatched,

    #[error("rate limit exceeded, retry after {0:?}")]
    RateLimited(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("payment required")]
    Challenge(ChallengeHeaders),
}

/// Whether the caller expects gRPC-style errors, per the `content-type:
/// application/grpc*` convention used throughout §4.6/§6.
pub fn is_grpc_request(content_type: Option<&str>) -> bool {
    content_type
        .map(|v| v.starts_with("application/grpc"))
        .unwrap_or(false)
}

struct StatusInfo {
    rest_status: StatusCode,
    grpc_status: u16,
    message: String,
    retry_after: Option<Duration>,
}

impl AppError {
    fn status_info(&self) -> StatusInfo {
        match self {
            AppError::L402(err) => StatusInfo {
                rest_status: StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                grpc_status: err.grpc_status(),
                message: reply_body(err).to_string(),
                retry_after: matches!(err, l402_common::L402Error::RateLimited)
                    .then_some(Duration::from_secs(1)),
            },
            AppError::Hashmail(err) => StatusInfo {
                rest_status: hashmail_rest_status(err),
                grpc_status: hashmail_grpc_status(err),
                message: err.to_string(),
                retry_after: None,
            },
            AppError::NoBackendMatched => StatusInfo {
                rest_status: StatusCode::INTERNAL_SERVER_ERROR,
                grpc_status: 13,
                message: "no backend matched this request".to_string(),
                retry_after: None,
            },
            AppError::RateLimited(retry_after) => StatusInfo {
                rest_status: StatusCode::TOO_MANY_REQUESTS,
                grpc_status: 8,
                message: "rate limit exceeded".to_string(),
                retry_after: Some(*retry_after),
            },
            AppError::Upstream(msg) => StatusInfo {
                rest_status: StatusCode::BAD_GATEWAY,
                grpc_status: 14,
                message: msg.clone(),
                retry_after: None,
            },
            AppError::Challenge(_) => unreachable!("Challenge is rendered directly by respond()"),
        }
    }
}

/// §6's HTTP surface pins specific bodies for the 402/403 cases; every
/// other `L402Error` falls back to its `Display` message.
fn reply_body(err: &l402_common::L402Error) -> &str {
    use l402_common::L402Error::*;
    match err {
        NotAuthorized(_) | InvalidPreimage | SignatureMismatch | SecretNotFound => "payment required",
        Blocked => "access denied",
        _ => "request failed",
    }
}

fn hashmail_rest_status(err: &HashmailError) -> StatusCode {
    match err {
        HashmailError::AlreadyExists => StatusCode::CONFLICT,
        HashmailError::NotFound => StatusCode::NOT_FOUND,
        HashmailError::AlreadyInUse => StatusCode::CONFLICT,
        HashmailError::Canceled => StatusCode::BAD_REQUEST,
        HashmailError::Closed => StatusCode::BAD_GATEWAY,
        HashmailError::Malformed(_) => StatusCode::BAD_REQUEST,
    }
}

fn hashmail_grpc_status(err: &HashmailError) -> u16 {
    match err {
        HashmailError::AlreadyExists => 6,
        HashmailError::NotFound => 5,
        HashmailError::AlreadyInUse => 9,
        HashmailError::Canceled => 1,
        HashmailError::Closed => 14,
        HashmailError::Malformed(_) => 3,
    }
}

impl AppError {
    /// Renders the response for the engine pipeline (§4.6's
    /// "Direct-response shape"): gRPC requests always get HTTP 200 with
    /// status folded into `Grpc-Status`/`Grpc-Message`; REST requests get
    /// the natural status code and a plain-text body.
    pub fn respond(&self, is_grpc: bool) -> Response {
        tracing::warn!(error = %self, is_grpc, "request rejected");

        if let AppError::Challenge(challenge) = self {
            let status = if is_grpc { StatusCode::OK } else { StatusCode::PAYMENT_REQUIRED };
            let mut response = (status, "payment required").into_response();
            for value in &challenge.authorization {
                if let Ok(header) = HeaderValue::from_str(value) {
                    response.headers_mut().append("Authorization", header);
                }
            }
            if is_grpc {
                response.headers_mut().insert("Grpc-Status", HeaderValue::from_static("16"));
                response
                    .headers_mut()
                    .insert("Grpc-Message", HeaderValue::from_static("payment required"));
            }
            return response;
        }

        let info = self.status_info();
        let status = if is_grpc { StatusCode::OK } else { info.rest_status };
        let mut response = (status, info.message.clone()).into_response();

        if let Some(retry_after) = info.retry_after {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        if is_grpc {
            if let Ok(grpc_status) = HeaderValue::from_str(&info.grpc_status.to_string()) {
                response.headers_mut().insert("Grpc-Status", grpc_status);
            }
            if let Ok(grpc_message) = HeaderValue::from_str(&info.message) {
                response.headers_mut().insert("Grpc-Message", grpc_message);
            }
        }

        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.respond(false)
    }
}
