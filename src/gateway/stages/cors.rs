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

use anyhow::Result;
use async_trait::async_trait;
use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN,
};

use crate::gateway::flow::Exchange;

use super::RewriteStage;

/// Re-enforces the remote's CORS decision against the origin the page really
/// has. All tunneled pages share the gateway's origin, so left alone the
/// browser would grant every cross-origin read the remote allowed for anyone.
/// This stage compares `Access-Control-Allow-Origin` against the origin the
/// worker recorded and only then re-targets it at the gateway:
///
/// - `*` stays a wildcard grant.
/// - An exact match for the recorded origin is rewritten to the gateway's
///   origin, keeping the credentials flag.
/// - A mismatch means the remote did not allow this caller; the grant is
///   removed so the browser blocks the read just as it would have without
///   the tunnel.
/// - With no recorded origin there is no caller to judge, so no CORS grant
///   survives at all.
pub struct CorsStage;

#[async_trait]
impl RewriteStage for CorsStage {
    async fn on_response(&self, exchange: &mut Exchange<'_>) -> Result<()> {
        let allowed = exchange
            .response
            .headers
            .get(ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Some(allowed) = allowed else {
            return Ok(());
        };

        match exchange.ctx.origin.as_deref() {
            None => {
                exchange.response.headers.remove(ACCESS_CONTROL_ALLOW_ORIGIN);
                exchange
                    .response
                    .headers
                    .remove(ACCESS_CONTROL_ALLOW_CREDENTIALS);
            }
            Some(_) if allowed == "*" => {}
            Some(recorded) if allowed == recorded => {
                let value = HeaderValue::from_str(&exchange.origins.main_origin)
                    .unwrap_or(HeaderValue::from_static("null"));
                exchange
                    .response
                    .headers
                    .insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
            Some(_) => {
                exchange.response.headers.remove(ACCESS_CONTROL_ALLOW_ORIGIN);
                exchange
                    .response
                    .headers
                    .remove(ACCESS_CONTROL_ALLOW_CREDENTIALS);
            }
        }
        Ok(())
    }
}
