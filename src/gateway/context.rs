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
    header::{HeaderValue, CONTENT_LENGTH, ORIGIN, REFERER, TRANSFER_ENCODING},
    HeaderMap, Method, Uri,
};
use url::Url;
use uuid::Uuid;

use crate::config::OriginMap;

use super::url::{resolve, TargetUrl};

/// Worker protocol version declared by an already-installed worker.
pub const WORKER_VERSION_HEADER: &str = "x-portalgate-worker-version";
/// Referrer of the page as the worker observed it, before interception.
pub const REFERRER_HEADER: &str = "x-portalgate-referrer";
/// Origin of the page as the worker observed it, before interception.
pub const ORIGIN_HEADER: &str = "x-portalgate-origin";
/// The browser fetch mode (`cors`, `navigate`, ...) forwarded by the worker.
pub const MODE_HEADER: &str = "x-portalgate-mode";
/// Query parameter carrying an origin override for the resolver; consumed
/// here and never forwarded upstream.
pub const ORIGIN_OVERRIDE_PARAM: &str = "_pgorigin";

/// Everything the pipeline knows about one inbound request, built once at the
/// start of the pipeline and immutable afterwards. Gateway-private headers
/// are consumed during construction, the Origin-restoration rule is applied,
/// and the origin-concealment transform runs before the context is sealed, so
/// every later stage sees the same scrubbed view.
#[derive(Debug)]
pub struct RequestContext {
    /// Unique identifier for this exchange (UUID v7 = timestamp-sortable),
    /// used to correlate telemetry and log lines.
    pub id: Uuid,

    pub method: Method,

    /// Caller headers, already scrubbed: gateway-private headers removed,
    /// `Referer`/`Origin` rewritten per the restoration and concealment
    /// rules. Ready for the outbound builder.
    pub headers: HeaderMap,

    /// Caller query string with the origin-override parameter removed.
    pub query: String,

    /// The forwarded path exactly as received (leading slash stripped); the
    /// canonicalization redirect compares against this.
    pub raw_requested: String,

    pub worker_version: Option<u64>,

    /// Origin declared by the worker, recorded before any scrubbing. CORS
    /// enforcement keys off this, not off what was forwarded upstream.
    pub origin: Option<String>,

    pub referrer: Option<String>,

    pub fetch_mode: Option<String>,

    pub target: TargetUrl,
}

impl RequestContext {
    pub fn from_parts(
        origins: &OriginMap,
        method: Method,
        uri: &Uri,
        mut headers: HeaderMap,
    ) -> Self {
        let raw_requested = uri
            .path()
            .strip_prefix('/')
            .unwrap_or(uri.path())
            .to_string();

        let (mut query, origin_override) =
            extract_origin_override(uri.query().unwrap_or_default());

        let worker_version = take_header(&mut headers, WORKER_VERSION_HEADER)
            .and_then(|v| v.parse::<u64>().ok());

        // A declared referrer becomes a real Referer header; the override
        // header itself never travels upstream.
        let referrer = take_header(&mut headers, REFERRER_HEADER);
        if let Some(ref value) = referrer {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(REFERER, value);
            }
        }

        // Origin is suppressed by default and restored only when the worker
        // declared an explicitly cross-origin fetch or a non-safe method.
        // Narrow on purpose: this mirrors what a browser would have sent had
        // the worker not swallowed the original request.
        headers.remove(ORIGIN);
        let origin = take_header(&mut headers, ORIGIN_HEADER);
        let fetch_mode = take_header(&mut headers, MODE_HEADER);
        if let Some(ref declared) = origin {
            let unsafe_method = method != Method::GET && method != Method::HEAD;
            if fetch_mode.as_deref() == Some("cors") || unsafe_method {
                if let Ok(value) = HeaderValue::from_str(declared) {
                    headers.insert(ORIGIN, value);
                }
            }
        }

        let mut target = resolve(&raw_requested, origin_override.as_deref());

        // Any declared Origin/Referrer marks this as a page-initiated fetch;
        // run the concealment transform so nothing naming the gateway's own
        // origin survives into the upstream request.
        let origin_domain = origin
            .as_deref()
            .and_then(host_of)
            .or_else(|| referrer.as_deref().and_then(host_of));
        if origin_domain.is_some() {
            conceal_origin(origins, &mut headers, &mut target, &mut query);
        }

        Self {
            id: Uuid::now_v7(),
            method,
            headers,
            query,
            raw_requested,
            worker_version,
            origin,
            referrer,
            fetch_mode,
            target,
        }
    }

    /// Declared request body size, if any.
    pub fn content_length(&self) -> u64 {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Whether the caller framed a request body, by declared length or by
    /// chunked transfer coding. The body stream is only attached to the
    /// outbound request when this holds.
    pub fn has_body(&self) -> bool {
        self.content_length() > 0 || self.headers.contains_key(TRANSFER_ENCODING)
    }
}

/// Domain-concealment transform: strips or unwraps every place the gateway's
/// own identity could leak into the upstream request.
///
/// - A `Referer` that tunnels through the gateway
///   (`https://gw/https://real.site/page`) is unwrapped to the embedded
///   remote URL; one merely pointing at the gateway is dropped.
/// - An `Origin` naming the gateway is dropped; an origin header has no
///   embedded remote to recover.
/// - Gateway-origin prefixes inside the query unwrap to direct remote URLs,
///   so tunneled links in query parameters don't advertise the gateway.
///
/// Invariant: after this runs, the gateway's origin appears in neither
/// `Origin` nor `Referer`.
fn conceal_origin(
    origins: &OriginMap,
    headers: &mut HeaderMap,
    target: &mut TargetUrl,
    query: &mut String,
) {
    let tunnel_prefix = format!("{}/", origins.main_origin);

    let referer = headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(referer) = referer {
        if let Some(embedded) = referer.strip_prefix(&tunnel_prefix) {
            match HeaderValue::from_str(embedded) {
                Ok(value) if embedded.starts_with("http://") || embedded.starts_with("https://") => {
                    headers.insert(REFERER, value);
                }
                _ => {
                    headers.remove(REFERER);
                }
            }
        } else if host_of(&referer).as_deref() == Some(&origins.main_domain) {
            headers.remove(REFERER);
        }
    }

    let origin_is_gateway = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .and_then(host_of)
        .is_some_and(|host| host == origins.main_domain);
    if origin_is_gateway {
        headers.remove(ORIGIN);
    }

    if query.contains(&tunnel_prefix) {
        *query = query.replace(&tunnel_prefix, "");
    }
    if target.query.contains(&tunnel_prefix) {
        target.query = target.query.replace(&tunnel_prefix, "");
    }
}

/// Removes a header and hands back its text value, if it parsed as UTF-8.
fn take_header(headers: &mut HeaderMap, name: &str) -> Option<String> {
    headers
        .remove(name)
        .and_then(|v| v.to_str().ok().map(str::to_string))
}

/// Host (including port) of an absolute URL string.
fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Splits the origin-override parameter out of the raw query string. Only
/// the override pair is removed and decoded; every other pair keeps the
/// caller's original bytes, so upstream sees exactly the encoding the
/// browser produced.
fn extract_origin_override(raw_query: &str) -> (String, Option<String>) {
    if raw_query.is_empty() || !raw_query.contains(ORIGIN_OVERRIDE_PARAM) {
        return (raw_query.to_string(), None);
    }

    let mut origin_override = None;
    let mut kept = Vec::new();
    for pair in raw_query.split('&') {
        let key = pair.split('=').next().unwrap_or(pair);
        if key == ORIGIN_OVERRIDE_PARAM {
            origin_override = url::form_urlencoded::parse(pair.as_bytes())
                .next()
                .map(|(_, value)| value.into_owned());
        } else {
            kept.push(pair);
        }
    }
    (kept.join("&"), origin_override)
}
