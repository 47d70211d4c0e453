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

use http::{
    header::{CONTENT_LENGTH, EXPECT, HOST, TRANSFER_ENCODING},
    HeaderMap, Method,
};

use super::context::RequestContext;

/// The request handed to the transport pipe, owned exclusively by it for the
/// duration of one upstream call.
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<reqwest::Body>,
}

/// Assembles the outbound request from a sealed context. Method, query, and
/// body stream are copied unchanged; the context already carried out the
/// identity scrubbing (gateway headers, Origin restoration, concealment), so
/// the remaining work is purely mechanical:
///
/// - `Host` is dropped; the transport derives it from the target domain.
/// - `Content-Length` and `Transfer-Encoding` must not both be declared; when
///   they are, `Transfer-Encoding` loses since the length is authoritative.
pub fn build_outbound(ctx: &RequestContext, body: Option<reqwest::Body>) -> OutboundRequest {
    build_with_method(ctx, ctx.method.clone(), body)
}

/// HEAD variant of the same request, used by the worker negotiator's content
/// probe. The probe carries no body, so the caller's body-framing headers
/// (`Content-Length`, `Transfer-Encoding`, `Expect`) must not travel with it;
/// an upstream honoring a declared length would wait for bytes that never
/// arrive.
pub fn build_probe(ctx: &RequestContext) -> OutboundRequest {
    let mut probe = build_with_method(ctx, Method::HEAD, None);
    probe.headers.remove(CONTENT_LENGTH);
    probe.headers.remove(TRANSFER_ENCODING);
    probe.headers.remove(EXPECT);
    probe
}

fn build_with_method(
    ctx: &RequestContext,
    method: Method,
    body: Option<reqwest::Body>,
) -> OutboundRequest {
    let mut headers = ctx.headers.clone();
    headers.remove(HOST);
    if headers.contains_key(CONTENT_LENGTH) {
        headers.remove(TRANSFER_ENCODING);
    }

    OutboundRequest {
        method,
        url: target_url_with_query(ctx),
        headers,
        body,
    }
}

/// Joins the resolved target with the caller's query string. The target's own
/// embedded query (rare; only from tunneled URLs that carried one) comes
/// first, matching the order the browser produced.
fn target_url_with_query(ctx: &RequestContext) -> String {
    let base = ctx.target.base_url();
    let query = match (ctx.target.query.is_empty(), ctx.query.is_empty()) {
        (true, true) => String::new(),
        (false, true) => ctx.target.query.clone(),
        (true, false) => ctx.query.clone(),
        (false, false) => format!("{}&{}", ctx.target.query, ctx.query),
    };
    if query.is_empty() {
        base
    } else {
        format!("{base}?{query}")
    }
}
