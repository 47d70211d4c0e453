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
use axum::body::Body;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};

use super::{
    context::RequestContext,
    error::GatewayError,
    flow::UpstreamParts,
    outbound::{build_probe, OutboundRequest},
};

/// Upstream body relay granularity. Bounds per-request memory to a small
/// constant multiple of this regardless of payload size.
pub const CHUNK_SIZE: usize = 1024;

/// The transport pipe: owns the upstream HTTP client and turns an
/// [`OutboundRequest`] into response metadata plus a lazily-relayed body.
///
/// Redirects are never followed here. A redirect must be rewritten and handed
/// back to the browser so its address bar and the worker's URL logic stay in
/// sync with the real resource location.
pub struct Pipe {
    client: reqwest::Client,
}

impl Pipe {
    pub fn new() -> Result<Self> {
        // No automatic decompression: the body must relay byte-for-byte or
        // the forwarded Content-Encoding/Content-Length headers would lie.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self { client })
    }

    /// Sends the outbound request and exposes the remote response as metadata
    /// plus a streaming body re-chunked to [`CHUNK_SIZE`]. The browser starts
    /// receiving as soon as upstream starts sending; if the browser hangs up,
    /// axum drops the body stream, which drops the reqwest response and
    /// releases the upstream connection.
    pub async fn send(
        &self,
        outbound: OutboundRequest,
    ) -> Result<(UpstreamParts, Body), GatewayError> {
        let url_text = outbound.url.clone();

        let mut request = self
            .client
            .request(outbound.method, &outbound.url)
            .headers(outbound.headers);
        if let Some(body) = outbound.body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::from_transport(&err, &url_text))?;

        let parts = UpstreamParts {
            final_url: response.url().clone(),
            status: response.status(),
            headers: response.headers().clone(),
        };
        let body = Body::from_stream(rechunk(response.bytes_stream()));
        Ok((parts, body))
    }

    /// Headers-only probe used by the worker negotiator to sniff the target's
    /// content type before committing to an install page. The (empty) HEAD
    /// body is dropped immediately.
    pub async fn probe(&self, ctx: &RequestContext) -> Result<UpstreamParts, GatewayError> {
        let (parts, _body) = self.send(build_probe(ctx)).await?;
        Ok(parts)
    }
}

/// Re-chunks an upstream byte stream into fixed-size pieces. `Bytes::split_to`
/// slices without copying, so a large upstream chunk costs one allocation at
/// the source and nothing here. Forward-only, single consumer, never rewound.
fn rechunk<S>(upstream: S) -> impl Stream<Item = std::io::Result<Bytes>>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream::unfold((upstream, Bytes::new()), |(mut source, mut carry)| async {
        loop {
            if !carry.is_empty() {
                let take = carry.split_to(carry.len().min(CHUNK_SIZE));
                return Some((Ok(take), (source, carry)));
            }
            match source.next().await {
                Some(Ok(chunk)) => carry = chunk,
                Some(Err(err)) => {
                    return Some((Err(std::io::Error::other(err)), (source, carry)));
                }
                None => return None,
            }
        }
    })
}
