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
use http::header::HeaderValue;

use crate::gateway::flow::Exchange;

use super::RewriteStage;

const CSP: &str = "content-security-policy";
const CSP_REPORT_ONLY: &str = "content-security-policy-report-only";

/// Loosens `Content-Security-Policy` just enough for tunneled pages to load.
///
/// Every sub-resource on a tunneled page now comes from the gateway's origin,
/// so a policy that named the remote's own hosts would block everything. The
/// gateway's origin is appended to each source-list directive; the remote's
/// original sources stay listed so the policy still reads as intended.
/// `'none'` directives are left alone: a resource class the remote banned
/// outright stays banned.
pub struct CspStage;

#[async_trait]
impl RewriteStage for CspStage {
    async fn on_response(&self, exchange: &mut Exchange<'_>) -> Result<()> {
        let gateway = exchange.origins.main_origin.clone();
        for name in [CSP, CSP_REPORT_ONLY] {
            let policies: Vec<String> = exchange
                .response
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(|v| admit_origin(v, &gateway))
                .collect();
            if policies.is_empty() {
                continue;
            }
            exchange.response.headers.remove(name);
            for policy in policies {
                let value =
                    HeaderValue::from_str(&policy).context("invalid CSP after rewrite")?;
                exchange.response.headers.append(name, value);
            }
        }
        Ok(())
    }
}

/// Whether a directive carries a source list the gateway must appear in.
fn is_source_directive(name: &str) -> bool {
    name.ends_with("-src")
        || matches!(name, "base-uri" | "form-action" | "frame-ancestors")
}

/// Appends `gateway` to every source-list directive of a policy (a header
/// value may carry several comma-separated policies). Idempotent: an origin
/// already listed is not added twice.
fn admit_origin(header_value: &str, gateway: &str) -> String {
    header_value
        .split(',')
        .map(|policy| {
            policy
                .split(';')
                .map(|directive| rewrite_directive(directive.trim(), gateway))
                .filter(|d| !d.is_empty())
                .collect::<Vec<_>>()
                .join("; ")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn rewrite_directive(directive: &str, gateway: &str) -> String {
    let mut tokens = directive.split_whitespace();
    let Some(name) = tokens.next() else {
        return String::new();
    };
    let sources: Vec<&str> = tokens.collect();

    if !is_source_directive(name) || sources == ["'none'"] || sources.contains(&gateway) {
        return directive.to_string();
    }
    format!("{} {}", directive, gateway)
}
