//! Development reverse proxy.
//!
//! During frontend development the JS toolchain runs its own server with
//! hot reload (Vite, webpack-dev-server, ...). [`DevProxy`] forwards every
//! request it receives to that server, so the app is reached through the
//! same origin as the API routes. The dev server's hot-reload channel is a
//! websocket, so `101 Switching Protocols` answers are tunnelled both ways.

use std::str::FromStr;

use bytes::Bytes;
use http::header::{CONNECTION, HeaderMap, HeaderName, HeaderValue, HOST, UPGRADE};
use http::uri::{PathAndQuery, Scheme};
use http::{StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tracing::{debug, error};

use crate::error::Error;
use crate::handler::{BoxFuture, Handler};
use crate::request::Request;
use crate::response::Response;

/// Headers meaningful only for a single connection, never forwarded.
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

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Reverse proxy to one upstream development server.
#[derive(Clone)]
pub struct DevProxy {
    upstream: Uri,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl DevProxy {
    /// Proxies to `frontend_address`, e.g. `http://localhost:5173`.
    ///
    /// The address must be an absolute `http` URL; anything else is
    /// [`Error::InvalidUpstream`]. Treat that as fatal at startup.
    ///
    /// `https` upstreams are rejected too: the proxy has no TLS connector,
    /// and dev servers listen on plain HTTP.
    pub fn new(frontend_address: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidUpstream {
            address: frontend_address.to_owned(),
            reason: reason.to_owned(),
        };
        let upstream = Uri::from_str(frontend_address).map_err(|e| invalid(&e.to_string()))?;
        if upstream.scheme() == Some(&Scheme::HTTPS) {
            return Err(invalid("https upstreams are not supported, point at the dev server's plain http address"));
        }
        if upstream.scheme() != Some(&Scheme::HTTP) {
            return Err(invalid("scheme must be http"));
        }
        if upstream.authority().is_none() {
            return Err(invalid("missing host"));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self { upstream, client })
    }

    /// The upstream URI for `req`: upstream base path joined with the
    /// request path, request query kept.
    fn target(&self, req: &Request) -> Result<Uri, http::Error> {
        let base = self.upstream.path().trim_end_matches('/');
        let path_and_query = match req.query() {
            Some(q) => format!("{base}{}?{q}", req.path()),
            None => format!("{base}{}", req.path()),
        };
        let mut parts = self.upstream.clone().into_parts();
        parts.path_and_query = Some(PathAndQuery::from_str(&path_and_query)?);
        Ok(Uri::from_parts(parts)?)
    }

    async fn forward(&self, req: Request) -> Result<Response, ProxyError> {
        let target = self.target(&req)?;
        let upgrade_type = upgrade_type(req.headers());

        let mut outgoing = http::Request::builder()
            .method(req.method().clone())
            .uri(target)
            .body(Full::new(req.body().clone()))?;
        let headers = outgoing.headers_mut();
        *headers = req.headers().clone();
        strip_hop_by_hop(headers);
        if let Some(kind) = &upgrade_type {
            headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(UPGRADE, kind.clone());
        }
        if let Some(addr) = req.remote_addr() {
            let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {}", addr.ip()),
                None => addr.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert(X_FORWARDED_FOR.clone(), value);
            }
        }
        // The upstream sees the address it was configured with.
        headers.remove(HOST);

        let mut upstream_res = self.client.request(outgoing).await?;

        if upstream_res.status() == StatusCode::SWITCHING_PROTOCOLS {
            let mut headers = upstream_res.headers().clone();
            rewrite_upgrade(&mut headers);
            tunnel(req, hyper::upgrade::on(&mut upstream_res));
            return Ok(Response::from_parts(StatusCode::SWITCHING_PROTOCOLS, headers, Bytes::new()));
        }

        let (parts, body) = upstream_res.into_parts();
        let body = body.collect().await?.to_bytes();
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        rewrite_upgrade(&mut headers);
        Ok(Response::from_parts(parts.status, headers, body))
    }
}

impl Handler for DevProxy {
    fn call(&self, req: Request) -> BoxFuture {
        let proxy = self.clone();
        Box::pin(async move {
            let path = req.path().to_owned();
            match proxy.forward(req).await {
                Ok(res) => res,
                Err(e) => {
                    error!(upstream = %proxy.upstream, path, error = %e, "dev proxy request failed");
                    Response::status(StatusCode::BAD_GATEWAY)
                }
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum ProxyError {
    #[error("building upstream request: {0}")]
    Http(#[from] http::Error),
    #[error("upstream request: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),
    #[error("reading upstream body: {0}")]
    Body(#[from] hyper::Error),
}

/// A websocket answer must tell the client the connection is upgrading.
fn rewrite_upgrade(headers: &mut HeaderMap) {
    let is_websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    if is_websocket {
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    }
}

/// The protocol the client asked to upgrade to, if `Connection` says so.
fn upgrade_type(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if wants_upgrade { headers.get(UPGRADE).cloned() } else { None }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_str(token.trim()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Splices the client's upgraded connection onto the upstream's once both
/// sides have switched protocols.
fn tunnel(req: Request, upstream: hyper::upgrade::OnUpgrade) {
    let Some(client) = req.take_upgrade() else {
        error!(path = req.path(), "upstream switched protocols but the client connection cannot upgrade");
        return;
    };
    tokio::spawn(async move {
        let (client, upstream) = match tokio::try_join!(client, upstream) {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "dev proxy upgrade failed");
                return;
            }
        };
        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((up, down)) => debug!(up, down, "dev proxy tunnel closed"),
            Err(e) => debug!(error = %e, "dev proxy tunnel closed with error"),
        }
    });
}
