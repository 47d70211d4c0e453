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

use crate::config::OriginMap;

use super::{error::GatewayError, url::TargetUrl};

/// Validates a resolved target before anything goes on the wire. Rejections
/// are returned as values; nothing here is fallible beyond the checks
/// themselves, and a rejected URL never reaches the transport layer.
///
/// Scheme is checked before domain: a URL missing both yields
/// `MissingProtocol`, never `MissingDomain`, because the corrective redirect
/// gives the browser a second pass in which the domain check can run against
/// a fully qualified URL.
pub fn guard_incoming_url(
    target: &TargetUrl,
    caller_query: &str,
    origins: &OriginMap,
) -> Result<(), GatewayError> {
    if target.scheme != "http" && target.scheme != "https" {
        if target.scheme.is_empty() {
            let mut corrected = format!("https:{}", target.geturl());
            if !caller_query.is_empty() {
                corrected = format!("{corrected}?{caller_query}");
            }
            let location = format!("{}/{}", origins.main_origin, corrected);
            return Err(GatewayError::MissingProtocol {
                corrected,
                location,
            });
        }
        return Err(GatewayError::UnsupportedScheme(target.scheme.clone()));
    }
    if target.domain.is_empty() {
        return Err(GatewayError::MissingDomain(target.geturl()));
    }
    Ok(())
}
