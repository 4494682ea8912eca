//! Axum Handlers for the HTTP API
//!
//! The health check and the inbound-call webhook. The webhook answers the
//! telephony provider with instructions to open a media stream back to this
//! server's `/media-stream` endpoint.

use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};

use crate::models::{ErrorResponse, HealthResponse};

pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Reports that the relay is up.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    ),
    tag = "Call Relay"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Media stream relay is running".to_string(),
    })
}

/// Answers an inbound call with media stream connection instructions.
///
/// The stream URL is built from the request's `Host` header, so the
/// instructions point back at whichever address the provider reached.
#[utoipa::path(
    post,
    path = "/incoming-call",
    responses(
        (status = 200, description = "Connection instructions", body = String, content_type = "text/xml"),
        (status = 400, description = "Missing or invalid Host header", body = ErrorResponse)
    ),
    tag = "Call Relay"
)]
pub async fn incoming_call(headers: HeaderMap) -> Result<Response, ApiError> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| is_valid_host(host))
        .ok_or_else(|| ApiError::BadRequest("Missing or invalid Host header".to_string()))?;

    Ok(([(header::CONTENT_TYPE, "text/xml")], connect_instructions(host)).into_response())
}

fn connect_instructions(host: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Connect>
        <Stream url="wss://{host}/media-stream" />
    </Connect>
</Response>"#
    )
}

// The host ends up inside an XML attribute.
fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.message, "Media stream relay is running");
    }

    #[tokio::test]
    async fn test_incoming_call_points_at_media_stream() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("relay.example.com"));

        let response = match incoming_call(headers).await {
            Ok(response) => response,
            Err(_) => panic!("Expected connection instructions"),
        };
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );

        let body = body_string(response).await;
        assert!(body.contains(r#"<Stream url="wss://relay.example.com/media-stream" />"#));
        assert!(body.contains("<Connect>"));
    }

    #[tokio::test]
    async fn test_incoming_call_rejects_bad_host() {
        let response = incoming_call(HeaderMap::new()).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::HOST,
            HeaderValue::from_static("evil.com\"/><Hangup/>"),
        );
        let response = incoming_call(headers).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_is_valid_host() {
        assert!(is_valid_host("localhost:5050"));
        assert!(is_valid_host("abc123.ngrok-free.app"));
        assert!(is_valid_host("[::1]:5050"));
        assert!(!is_valid_host(""));
        assert!(!is_valid_host("a b"));
    }
}
