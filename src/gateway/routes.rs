/* Portalgate (AGPL-3.0)

Copyright (C) 2026 - Portalgate Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{CONTENT_TYPE, LOCATION},
        HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;

use crate::config::{OriginMap, PassthroughConfig};
use crate::telemetry::TelemetrySink;

use super::{
    context::RequestContext,
    error::GatewayError,
    flow::Exchange,
    guard::guard_incoming_url,
    outbound::build_outbound,
    pipe::Pipe,
    stages::RewritePipeline,
    worker::{self, WorkerState},
};

/// Process-wide read-only state shared by every handler. Requests are fully
/// independent; nothing here is mutated after startup.
pub struct GatewayState {
    pub origins: OriginMap,
    pub passthrough: PassthroughConfig,
    pub pipe: Pipe,
    pub rewrites: RewritePipeline,
    pub telemetry: TelemetrySink,
}

/// The HTTP surface: a few gateway-owned control routes, and a fallback that
/// treats every other path as a tunneled remote URL.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/index.html", get(home))
        .route("/service-worker.js", get(service_worker))
        .route("/service-worker-reinstall", get(service_worker_reinstall))
        .fallback(forward)
        .with_state(state)
}

async fn home(State(state): State<Arc<GatewayState>>) -> Html<String> {
    Html(worker::home_page(&state.origins))
}

/// Serves the interception worker. Browsers fetch a registering script with
/// `Service-Worker: script`; anything else (a curious tab, a crawler) gets a
/// 403 rather than the script body.
async fn service_worker(
    State(state): State<Arc<GatewayState>>,
    request: Request,
) -> Response {
    let is_worker_fetch = request
        .headers()
        .get("service-worker")
        .and_then(|v| v.to_str().ok())
        == Some("script");
    if !is_worker_fetch {
        return StatusCode::FORBIDDEN.into_response();
    }

    let script = worker::worker_script(&state.origins, &state.passthrough);
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/javascript")),
            (
                http::HeaderName::from_static("service-worker-allowed"),
                HeaderValue::from_static("/"),
            ),
        ],
        script,
    )
        .into_response()
}

async fn service_worker_reinstall() -> Html<String> {
    Html(worker::reinstall_page())
}

/// The catch-all forwarding route. Path+query encode the target URL; the
/// worker negotiator decides whether this request is forwarded, answered with
/// an install page, or probed first.
async fn forward(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&state.origins, parts.method, &parts.uri, parts.headers);

    if let Err(err) = guard_incoming_url(&ctx.target, &ctx.query, &state.origins) {
        return err.into_response();
    }

    // Canonicalization: when the resolved URL spells differently from what
    // was requested (scheme promoted, path normalized), redirect so the
    // address bar and the worker share one canonical form.
    let canonical = ctx.target.geturl();
    if canonical != ctx.raw_requested {
        let mut destination = canonical;
        if !ctx.query.is_empty() {
            destination = format!("{destination}?{}", ctx.query);
        }
        let location = format!("{}/{}", state.origins.main_origin, destination);
        return redirect_307(&location);
    }

    match worker::negotiate(ctx.worker_version) {
        WorkerState::Current => fetch(&state, &ctx, body).await,
        WorkerState::Stale(declared) => {
            tracing::debug!(declared, "stale worker, serving upgrade page");
            Html(worker::install_page(&ctx.target.geturl())).into_response()
        }
        WorkerState::NoWorker => {
            // First contact: only HTML navigations need the worker installed
            // before the real fetch; a bare asset link forwards directly.
            let head = match state.pipe.probe(&ctx).await {
                Ok(parts) => parts,
                Err(err) => return err.into_response(),
            };
            let is_html = head
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("text/html"));
            if is_html {
                Html(worker::install_page(&ctx.target.geturl())).into_response()
            } else {
                fetch(&state, &ctx, body).await
            }
        }
    }
}

/// Runs the full pipeline: outbound build, transport, rewrite stages, then
/// the streamed relay body.
async fn fetch(state: &GatewayState, ctx: &RequestContext, body: Body) -> Response {
    let outbound_body = if ctx.has_body() {
        Some(reqwest::Body::wrap_stream(body.into_data_stream()))
    } else {
        None
    };
    let outbound = build_outbound(ctx, outbound_body);

    let (upstream, relay) = match state.pipe.send(outbound).await {
        Ok(parts) => parts,
        Err(err) => return err.into_response(),
    };

    let mut exchange = Exchange::new(ctx, &state.origins, upstream);
    if let Err(err) = state.rewrites.process(&mut exchange).await {
        tracing::error!(error = %err, request_id = %ctx.id, "response rewrite failed");
        return GatewayError::UnknownTransport {
            url: ctx.target.geturl(),
            kind: "RewriteError".to_string(),
        }
        .into_response();
    }

    state.telemetry.emit(
        "forward",
        ctx.id,
        json!({
            "method": ctx.method.as_str(),
            "target": exchange.upstream.final_url.as_str(),
            "status": exchange.response.status.as_u16(),
        }),
    );

    let mut response = Response::new(relay);
    *response.status_mut() = exchange.response.status;
    *response.headers_mut() = exchange.response.headers;
    response
}

fn redirect_307(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
