//! axum middleware wrapping the upstream proxy.

use super::authorizer::UploadAuthorizer;
use super::headers::UploadHeaders;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

/// Authorize `POST` uploads before they reach `next`; pass everything else.
///
/// Admitted uploads get the session response headers added to whatever the
/// upstream returns.
pub async fn require_upload_authorization(
    State(authorizer): State<Arc<UploadAuthorizer>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    debug!("{} {}", req.method(), req.uri().path());

    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let upload = UploadHeaders::from_headers(req.headers());
    match authorizer.authorize(&upload).await {
        Ok(admission) => {
            let mut response = next.run(req).await;
            admission.apply(response.headers_mut());
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}
