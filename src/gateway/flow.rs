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

use http::{HeaderMap, StatusCode};
use url::Url;

use crate::config::OriginMap;

use super::context::RequestContext;

/// Metadata of the remote response, owned for the duration of one forwarding
/// call. The body is not here: it streams straight from the transport to the
/// outbound response and is consumed exactly once, front to back.
#[derive(Debug)]
pub struct UpstreamParts {
    /// The URL the transport actually reached. Relative `Location` values and
    /// cookie paths resolve against this, not against what was requested.
    pub final_url: Url,

    pub status: StatusCode,

    pub headers: HeaderMap,
}

/// The response under construction for the browser. Each rewriting stage
/// mutates this in place; the streaming body is attached afterwards.
#[derive(Debug, Default)]
pub struct ResponseParts {
    pub status: StatusCode,

    pub headers: HeaderMap,
}

/// One request/response pair moving through the rewrite pipeline. Owned by a
/// single task, so stages mutate it with `&mut` and no synchronization.
#[derive(Debug)]
pub struct Exchange<'a> {
    pub ctx: &'a RequestContext,

    pub origins: &'a OriginMap,

    pub upstream: UpstreamParts,

    pub response: ResponseParts,
}

impl<'a> Exchange<'a> {
    pub fn new(ctx: &'a RequestContext, origins: &'a OriginMap, upstream: UpstreamParts) -> Self {
        let response = ResponseParts {
            status: upstream.status,
            headers: HeaderMap::new(),
        };
        Self {
            ctx,
            origins,
            upstream,
            response,
        }
    }
}
