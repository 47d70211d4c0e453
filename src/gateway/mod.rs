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

//! The per-request forwarding core: URL resolution, guarding, outbound
//! construction, the streaming transport pipe, the response-rewriting stage
//! pipeline, and worker-version negotiation. Each inbound request gets its
//! own immutable [`context::RequestContext`]; nothing here shares mutable
//! state across requests.

pub mod context;
pub mod error;
pub mod flow;
pub mod guard;
pub mod outbound;
pub mod pipe;
pub mod routes;
pub mod stages;
pub mod url;
pub mod worker;

pub use error::GatewayError;
pub use routes::{router, GatewayState};
