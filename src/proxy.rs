//! Pass-through forwarding to the storage node API.
//!
//! Requests and responses are streamed; bodies are never buffered, so large
//! uploads and downloads flow straight through. Protocol upgrades (WebSocket)
//! are relayed as raw byte tunnels once the upstream answers `101`.

use crate::error::{Error, Result};
use axum::body::{Body, HttpBody};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwards requests to the upstream storage node.
#[derive(Clone)]
pub struct UpstreamProxy {
    inner: Arc<UpstreamInner>,
}

struct UpstreamInner {
    client: reqwest::Client,
    base: String,
}

impl UpstreamProxy {
    /// Create a proxy for `upstream_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the HTTP client cannot
    /// be built.
    pub fn new(upstream_url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(upstream_url)
            .map_err(|e| Error::Config(format!("invalid upstream url '{upstream_url}': {e}")))?;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Proxy(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(UpstreamInner {
                client,
                base: parsed.as_str().trim_end_matches('/').to_string(),
            }),
        })
    }

    /// Upstream base URL without a trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.inner.base
    }

    /// Forward `req` upstream and stream the answer back.
    ///
    /// An upgrade request keeps its `Connection`/`Upgrade` headers; if the
    /// upstream switches protocols, both connections are spliced together
    /// in a background task.
    ///
    /// # Errors
    ///
    /// Returns `Error::Proxy` if the upstream cannot be reached, or answers
    /// `101` to a request that did not ask for an upgrade.
    pub async fn forward(&self, mut req: Request<Body>) -> Result<Response> {
        let upgrade = requested_upgrade(req.headers());
        let client_upgrade = upgrade.is_some().then(|| hyper::upgrade::on(&mut req));

        let (parts, body) = req.into_parts();
        let path = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let url = format!("{}{}", self.inner.base, path);

        debug!("Forwarding {} {}", parts.method, url);

        let mut headers = forwardable(&parts.headers);
        if let Some(ref protocol) = upgrade {
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(header::UPGRADE, protocol.clone());
        }

        let mut request = self.inner.client.request(parts.method, &url).headers(headers);
        if upgrade.is_none() && !body.is_end_stream() {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = request
            .send()
            .await
            .map_err(|e| Error::Proxy(format!("{url}: {e}")))?;

        let status = upstream.status();
        let mut headers = forwardable(upstream.headers());

        if status == StatusCode::SWITCHING_PROTOCOLS {
            let (Some(client_upgrade), Some(requested)) = (client_upgrade, upgrade) else {
                return Err(Error::Proxy(format!("{url}: unexpected 101 from upstream")));
            };
            let protocol = upstream
                .headers()
                .get(header::UPGRADE)
                .cloned()
                .unwrap_or(requested);
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(header::UPGRADE, protocol);

            tokio::spawn(tunnel(client_upgrade, upstream, url));

            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            return Ok(response);
        }

        let stream = upstream.bytes_stream().map_err(std::io::Error::other);

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Fallback handler: forward anything the gateway let through.
pub async fn forward_upstream(State(proxy): State<UpstreamProxy>, req: Request<Body>) -> Response {
    match proxy.forward(req).await {
        Ok(response) => response,
        Err(e) => {
            error!("Upstream request failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Proxy error: {e}")).into_response()
        }
    }
}

/// Relay bytes between the upgraded client and upstream connections until
/// either side closes.
async fn tunnel(client: OnUpgrade, upstream: reqwest::Response, target: String) {
    let mut upstream = match upstream.upgrade().await {
        Ok(io) => io,
        Err(e) => {
            warn!("Upstream upgrade for {target} failed: {e}");
            return;
        }
    };
    let mut client = match client.await {
        Ok(io) => TokioIo::new(io),
        Err(e) => {
            warn!("Client upgrade for {target} failed: {e}");
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((up, down)) => debug!("Tunnel to {target} closed: {up} bytes up, {down} bytes down"),
        Err(e) => debug!("Tunnel to {target} ended: {e}"),
    }
}

/// The `Upgrade` value if the request asks to switch protocols.
fn requested_upgrade(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    if wants_upgrade {
        headers.get(header::UPGRADE).cloned()
    } else {
        None
    }
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    out.remove(header::HOST);
    for name in &HOP_BY_HOP {
        out.remove(name);
    }
    out
}
