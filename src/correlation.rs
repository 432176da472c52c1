//! Correlation-id propagation (C1).
//!
//! Reads `x-correlation-id` from the request, generating a fresh UUIDv4 if
//! absent. The id is installed as the current value of a task-local context
//! variable, echoed on the response header, and the previous value is
//! restored on every exit path (normal or panicking) since `tokio::task_local`
//! scopes are dropped unconditionally when `scope(...)`'s future completes.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Returns the correlation id of the request currently being handled, or an
/// empty string outside of a request scope.
pub fn get_correlation_id() -> String {
    CORRELATION_ID
        .try_with(|id| id.clone())
        .unwrap_or_default()
}

/// Outer layer: installs the correlation id for the duration of the request
/// and mirrors it back on the response header.
pub async fn correlation_middleware(mut req: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(CORRELATION_ID_HEADER);
    let cid = req
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.headers_mut()
        .insert(header_name.clone(), HeaderValue::from_str(&cid).unwrap());

    let cid_for_response = cid.clone();
    let mut response = CORRELATION_ID.scope(cid, next.run(req)).await;

    response.headers_mut().insert(
        header_name,
        HeaderValue::from_str(&cid_for_response).unwrap(),
    );
    response
}

/// Wraps `correlation_middleware` (must be layered outside it so that, after
/// `next.run` returns, the correlation id set by the inner middleware is
/// still observable via task-local context). Emits structured log fields
/// `{correlationId, method, path, status, elapsedMs}`.
pub async fn request_logger_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();
    let correlation_id = get_correlation_id();

    if status >= 500 {
        tracing::error!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status,
            elapsed_ms,
            "request failed"
        );
    } else {
        tracing::info!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status,
            elapsed_ms,
            "request handled"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    async fn handler() -> &'static str {
        "ok"
    }

    fn app() -> Router {
        Router::new().route("/", get(handler)).layer(
            axum::middleware::from_fn(correlation_middleware),
        )
    }

    #[tokio::test]
    async fn generates_id_when_header_absent() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let header = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("header present");
        assert!(Uuid::parse_str(header.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn echoes_supplied_id() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(CORRELATION_ID_HEADER, "fixed-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let header = response.headers().get(CORRELATION_ID_HEADER).unwrap();
        assert_eq!(header.to_str().unwrap(), "fixed-id");
    }
}
