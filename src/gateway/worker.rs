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

use std::collections::BTreeSet;

use serde_json::json;

use crate::config::{OriginMap, PassthroughConfig};

/// Current worker protocol version. Bump whenever the script's interception
/// contract changes; installed workers declaring an older number are sent
/// through the upgrade flow.
pub const WORKER_VERSION: u64 = 2;

/// Outcome of comparing a client-declared worker version with the server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No version header: first visit, or a request the worker never saw.
    NoWorker,
    /// A worker is installed but speaks an older protocol.
    Stale(u64),
    /// The installed worker matches [`WORKER_VERSION`].
    Current,
}

pub fn negotiate(declared: Option<u64>) -> WorkerState {
    match declared {
        None => WorkerState::NoWorker,
        Some(v) if v == WORKER_VERSION => WorkerState::Current,
        Some(v) => WorkerState::Stale(v),
    }
}

/// Renders the service worker script with the negotiated settings embedded as
/// a JSON literal: protocol version, the gateway's own protocol/host, and the
/// computed passthrough allow-list. Domains on that list load directly,
/// without tunneling; it always contains the gateway's own service domains so
/// the worker never intercepts its own control traffic.
pub fn worker_script(origins: &OriginMap, passthrough: &PassthroughConfig) -> String {
    let mut domains: BTreeSet<&str> = BTreeSet::new();
    domains.insert(&origins.main_domain);
    for domain in &origins.service_domains {
        domains.insert(domain);
    }
    for domain in &passthrough.domains {
        domains.insert(domain);
    }

    let settings = json!({
        "version": WORKER_VERSION,
        "protocol": origins.scheme,
        "host": origins.main_domain,
        "passthrough": {
            "domains": domains
                .iter()
                .map(|d| (d.to_string(), serde_json::Value::Bool(true)))
                .collect::<serde_json::Map<_, _>>(),
            "urls": passthrough
                .urls
                .iter()
                .map(|u| (u.clone(), serde_json::Value::Bool(true)))
                .collect::<serde_json::Map<_, _>>(),
        },
    });

    format!(
        r#"/* portalgate service worker */
'use strict';

const settings = {settings};
const gateway = `${{settings.protocol}}://${{settings.host}}`;

self.addEventListener('install', () => self.skipWaiting());
self.addEventListener('activate', (event) => event.waitUntil(self.clients.claim()));

function shouldPassthrough(url) {{
    if (settings.passthrough.urls[url.href]) return true;
    return Boolean(settings.passthrough.domains[url.host]);
}}

function tunnel(request, url) {{
    const destination = `${{gateway}}/${{url.href}}`;
    const headers = new Headers(request.headers);
    headers.set('X-Portalgate-Worker-Version', String(settings.version));
    headers.set('X-Portalgate-Mode', request.mode);
    if (request.referrer) headers.set('X-Portalgate-Referrer', request.referrer);
    const origin = self.registration.scope.replace(/\/$/, '');
    headers.set('X-Portalgate-Origin', origin);
    return new Request(destination, {{
        method: request.method,
        headers: headers,
        body: request.method === 'GET' || request.method === 'HEAD' ? undefined : request.body,
        mode: 'same-origin',
        credentials: 'include',
        redirect: 'manual',
    }});
}}

self.addEventListener('fetch', (event) => {{
    const url = new URL(event.request.url);
    if (shouldPassthrough(url)) return;
    if (url.host === settings.host) {{
        // Tunneled URLs arrive as `/{{remote}}`; re-tag them so the server
        // knows an up-to-date worker produced this request.
        const embedded = url.pathname.slice(1) + url.search;
        if (!/^https?:\/\//.test(embedded)) return;
        event.respondWith(fetch(tunnel(event.request, new URL(embedded))));
        return;
    }}
    event.respondWith(fetch(tunnel(event.request, url)));
}});
"#
    )
}

/// First-visit page: registers the worker, then reloads so the freshly
/// installed worker intercepts the deep-linked target.
pub fn install_page(remote: &str) -> String {
    let remote = escape_html(remote);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>portalgate</title>
</head>
<body>
<noscript><p>JavaScript is required to browse through this gateway.</p></noscript>
<p>Setting things up&hellip;</p>
<script>
if ('serviceWorker' in navigator) {{
    navigator.serviceWorker.register('/service-worker.js', {{ scope: '/' }})
        .then((registration) => {{
            if (registration.active) return registration.update();
        }})
        .then(() => navigator.serviceWorker.ready)
        .then(() => window.location.reload());
}} else {{
    document.body.textContent = 'This browser does not support service workers.';
}}
</script>
<p hidden id="remote">{remote}</p>
</body>
</html>
"#
    )
}

/// Upgrade page a stale worker navigates itself to: unregisters every worker
/// on the scope, then reloads so the install flow runs again.
pub fn reinstall_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>portalgate &mdash; updating</title>
</head>
<body>
<p>Updating the gateway worker&hellip;</p>
<script>
navigator.serviceWorker.getRegistrations()
    .then((registrations) => Promise.all(registrations.map((r) => r.unregister())))
    .then(() => window.location.replace('/'));
</script>
</body>
</html>
"#
    .to_string()
}

/// Landing page at `/`: describes the gateway and installs the worker so the
/// next navigation can be tunneled.
pub fn home_page(origins: &OriginMap) -> String {
    let origin = escape_html(&origins.main_origin);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>portalgate</title>
</head>
<body>
<h1>portalgate</h1>
<p>Append any URL to <code>{origin}/</code> to browse it through this gateway,
for example <code>{origin}/https://example.com</code>.</p>
<script>
if ('serviceWorker' in navigator) {{
    navigator.serviceWorker.register('/service-worker.js', {{ scope: '/' }});
}}
</script>
</body>
</html>
"#
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn origins() -> OriginMap {
        OriginMap::derive(&ServerConfig {
            bind_address: "127.0.0.1".into(),
            bind_port: 8000,
            public_origin: "https://portal.example.com".into(),
        })
        .expect("origin map")
    }

    #[test]
    fn negotiation_matches_the_version_constant() {
        assert_eq!(negotiate(None), WorkerState::NoWorker);
        assert_eq!(negotiate(Some(WORKER_VERSION)), WorkerState::Current);
        assert_eq!(negotiate(Some(1)), WorkerState::Stale(1));
        assert_eq!(
            negotiate(Some(WORKER_VERSION + 1)),
            WorkerState::Stale(WORKER_VERSION + 1)
        );
    }

    #[test]
    fn script_embeds_version_and_host() {
        let script = worker_script(&origins(), &PassthroughConfig::default());
        assert!(script.contains("\"version\":2") || script.contains("\"version\": 2"));
        assert!(script.contains("portal.example.com"));
        assert!(script.contains("X-Portalgate-Worker-Version"));
    }

    #[test]
    fn script_allow_list_merges_service_and_configured_domains() {
        let passthrough = PassthroughConfig {
            domains: vec!["fonts.gstatic.com".into()],
            urls: vec!["https://cdn.example.com/app.js".into()],
        };
        let script = worker_script(&origins(), &passthrough);
        assert!(script.contains("static.portal.example.com"));
        assert!(script.contains("fonts.gstatic.com"));
        assert!(script.contains("https://cdn.example.com/app.js"));
    }

    #[test]
    fn install_page_escapes_the_remote_url() {
        let page = install_page("https://example.com/?q=<script>");
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("?q=<script>"));
    }
}
