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

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

/// Configuration loaders and structures for the portalgate server.
///
/// These types mirror `portalgate.example.toml` and apply sane defaults so a
/// minimal config only needs the public origin. Everything here is read once
/// at startup and treated as immutable for the lifetime of the process.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listener + public identity of the gateway.
    pub server: ServerConfig,
    /// Domains/URLs the interception worker is told to leave alone.
    #[serde(default)]
    pub passthrough: PassthroughConfig,
    /// Telemetry configuration (stdout vs structured log output).
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GatewayConfig {
    /// Reads the config file and deserializes TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: GatewayConfig = toml::from_str(&raw)
            .with_context(|| format!("invalid portalgate config: {}", path.display()))?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener (defaults to loopback for local testing).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port used for inbound browser connections.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    /// The origin browsers reach this gateway at, e.g. `https://portal.example.com`.
    ///
    /// Everything the rewriting stages emit (Location, cookies, CORS, CSP, the
    /// worker script) is expressed relative to this origin, so it must match
    /// what sits in front of the process (reverse proxy, TLS terminator).
    pub public_origin: String,
}

/// Default listener bind address (loopback).
fn default_bind_address() -> String {
    "127.0.0.1".into()
}

/// Default listener port when none is provided.
fn default_bind_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassthroughConfig {
    /// Domains the worker should never intercept (served natively by the browser).
    #[serde(default = "default_passthrough_domains")]
    pub domains: Vec<String>,
    /// Exact URLs the worker should never intercept.
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            domains: default_passthrough_domains(),
            urls: Vec::new(),
        }
    }
}

/// Web fonts are fetched with CORS-mode requests the remote CDNs already
/// permit, so tunneling them buys nothing.
fn default_passthrough_domains() -> Vec<String> {
    vec!["fonts.googleapis.com".into(), "fonts.gstatic.com".into()]
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub mode: TelemetryMode,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    /// Emit events through the tracing subscriber.
    #[default]
    Stdout,
    /// Print one JSON document per event to stdout.
    Json,
}

/// Process-wide, read-only map of the gateway's own identity, derived once
/// from [`ServerConfig::public_origin`] and passed by reference through the
/// pipeline. This replaces the request-time origin computation the rewriting
/// stages would otherwise repeat on every call.
#[derive(Debug, Clone)]
pub struct OriginMap {
    /// Scheme of the public origin (`http` or `https`).
    pub scheme: String,
    /// Public host, including port when non-default (`portal.example.com`).
    pub main_domain: String,
    /// Public origin with no trailing slash (`https://portal.example.com`).
    pub main_origin: String,
    /// Domains served by this deployment itself; the worker must never
    /// intercept these or it would tunnel the gateway through the gateway.
    pub service_domains: Vec<String>,
}

impl OriginMap {
    pub fn derive(server: &ServerConfig) -> Result<Self> {
        let url = Url::parse(&server.public_origin)
            .with_context(|| format!("invalid public_origin: {}", server.public_origin))?;
        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            bail!("public_origin must be http or https, got {scheme:?}");
        }
        let host = url
            .host_str()
            .with_context(|| format!("public_origin has no host: {}", server.public_origin))?;
        let main_domain = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let main_origin = format!("{scheme}://{main_domain}");
        let service_domains = vec![main_domain.clone(), format!("static.{main_domain}")];
        Ok(Self {
            scheme,
            main_domain,
            main_origin,
            service_domains,
        })
    }

    /// Bare loopback deployments must not claim a cookie `Domain` attribute;
    /// browsers reject `Domain=localhost` cookies outright.
    pub fn is_loopback(&self) -> bool {
        let host = self
            .main_domain
            .rsplit_once(':')
            .map(|(h, _)| h)
            .unwrap_or(&self.main_domain);
        host == "localhost" || host == "127.0.0.1"
    }
}
