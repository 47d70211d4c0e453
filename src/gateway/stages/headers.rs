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
use http::header::{HeaderMap, HeaderValue, CONNECTION, LOCATION, SET_COOKIE, TRANSFER_ENCODING};

use crate::gateway::flow::Exchange;

use super::RewriteStage;

/// Copies upstream response headers onto the outbound response.
///
/// `Set-Cookie` is withheld (the cookie stage rewrites it), and the
/// hop-by-hop `Transfer-Encoding`/`Connection` headers are dropped since the
/// outbound transport re-derives its own framing. A `Location` header is made
/// absolute against the URL that was actually reached and re-embedded under
/// the gateway's origin, so upstream redirects stay inside the tunnel.
pub struct HeaderRelayStage;

#[async_trait]
impl RewriteStage for HeaderRelayStage {
    async fn on_response(&self, exchange: &mut Exchange<'_>) -> Result<()> {
        let mut headers = HeaderMap::new();
        for (name, value) in exchange.upstream.headers.iter() {
            if name == SET_COOKIE || name == TRANSFER_ENCODING || name == CONNECTION {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        let location = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(location) = location {
            let absolute = exchange
                .upstream
                .final_url
                .join(&location)
                .map(|url| url.to_string())
                .unwrap_or(location);
            let rewritten = format!("{}/{}", exchange.origins.main_origin, absolute);
            headers.insert(
                LOCATION,
                HeaderValue::from_str(&rewritten)
                    .context("invalid Location after rewrite")?,
            );
        }

        exchange.response.headers = headers;
        Ok(())
    }
}
