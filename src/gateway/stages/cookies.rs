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

use anyhow::{Context, Result};
use async_trait::async_trait;
use cookie::Cookie;
use http::header::{HeaderValue, SET_COOKIE};
use url::Url;

use crate::gateway::flow::Exchange;

use super::RewriteStage;

/// Maps each upstream cookie onto the gateway's own origin so the browser
/// stores it against the gateway, not the remote site.
///
/// - Name, value, and expiry pass through unchanged.
/// - An explicit `Domain` is replaced with the gateway's domain, unless the
///   gateway runs on bare localhost/loopback, in which case the attribute is
///   omitted and the cookie stays host-only.
/// - A specified `Path` is rewritten to embed the remote scheme+host+path, so
///   path-scoped cookies from two different proxied sites key differently
///   even though both now live under the gateway's domain. Full URLs are not
///   a conventional cookie path; some browsers may discard such cookies, but
///   the collision-avoidance is deliberate.
/// - `Secure`, `HttpOnly`, and `SameSite` pass through unchanged; only
///   attributes the upstream actually resolved are applied.
pub struct CookieRewriteStage;

#[async_trait]
impl RewriteStage for CookieRewriteStage {
    async fn on_response(&self, exchange: &mut Exchange<'_>) -> Result<()> {
        let remote = &exchange.upstream.final_url;
        for raw in exchange.upstream.headers.get_all(SET_COOKIE) {
            let Ok(raw) = raw.to_str() else { continue };
            let Ok(upstream_cookie) = Cookie::parse(raw.to_string()) else {
                continue;
            };
            let rewritten = rewrite_cookie(
                &upstream_cookie,
                remote,
                &exchange.origins.main_domain,
                exchange.origins.is_loopback(),
            );
            let value = HeaderValue::from_str(&rewritten.to_string())
                .context("invalid Set-Cookie after rewrite")?;
            exchange.response.headers.append(SET_COOKIE, value);
        }
        Ok(())
    }
}

fn rewrite_cookie<'c>(
    upstream: &Cookie<'c>,
    remote: &Url,
    gateway_domain: &str,
    gateway_is_loopback: bool,
) -> Cookie<'static> {
    let mut out = Cookie::new(upstream.name().to_string(), upstream.value().to_string());

    if let Some(expires) = upstream.expires() {
        out.set_expires(expires);
    }
    if let Some(max_age) = upstream.max_age() {
        out.set_max_age(max_age);
    }
    if upstream.domain().is_some() && !gateway_is_loopback {
        out.set_domain(gateway_domain.to_string());
    }
    if let Some(path) = upstream.path() {
        let embedded = format!("{}{}", remote_origin(remote), path);
        out.set_path(embedded.trim_end_matches('/').to_string());
    }
    if let Some(secure) = upstream.secure() {
        out.set_secure(secure);
    }
    if let Some(http_only) = upstream.http_only() {
        out.set_http_only(http_only);
    }
    if let Some(same_site) = upstream.same_site() {
        out.set_same_site(same_site);
    }

    out
}

/// `scheme://host[:port]` of the URL the transport actually reached.
fn remote_origin(url: &Url) -> String {
    let mut origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        origin.push_str(&format!(":{port}"));
    }
    origin
}
