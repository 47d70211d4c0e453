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

use axum::{
    body::Body,
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Error taxonomy for the forwarding pipeline. Guard rejections are produced
/// before any outbound call; transport failures are mapped at the pipe
/// boundary. Every variant converts to exactly one HTTP response, and none
/// echoes upstream cookies, credentials, or internal diagnostics back to the
/// caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The forwarded URL has no scheme. Carries a fully corrected absolute
    /// URL (query preserved) re-routed through the gateway, so the caller is
    /// redirected rather than rejected.
    #[error("URL is missing a protocol, corrected to {corrected}")]
    MissingProtocol { corrected: String, location: String },

    #[error("unsupported URL scheme \"{0}\"")]
    UnsupportedScheme(String),

    #[error("URL <code>{0}</code> missing website domain name or location")]
    MissingDomain(String),

    /// Upstream produced an HTTP error status at the transport level.
    #[error("got HTTP {status} while accessing <code>{url}</code>")]
    UpstreamHttp { status: StatusCode, url: String },

    #[error("unable to access <code>{0}</code><br/>Too many redirects.")]
    TooManyRedirects(String),

    #[error(
        "unable to access <code>{0}</code><br/>A TLS error occurred, \
         remote server may not support HTTPS."
    )]
    Tls(String),

    #[error(
        "unable to access <code>{0}</code><br/>Resource may not exist, or be \
         available to the server, or outgoing traffic at the server may be disrupted."
    )]
    Connection(String),

    /// Catch-all transport failure. Surfaces the parsed URL and the error's
    /// category name, but not the underlying diagnostic detail.
    #[error(
        "<pre><code>An unhandled error occurred while processing this request.\n\
         Parsed URL: {url}\nError name: {kind}</code></pre>"
    )]
    UnknownTransport { url: String, kind: String },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingProtocol { .. } => StatusCode::TEMPORARY_REDIRECT,
            Self::UnsupportedScheme(_) | Self::MissingDomain(_) | Self::TooManyRedirects(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UpstreamHttp { status, .. } => *status,
            Self::Tls(_) | Self::Connection(_) => StatusCode::BAD_GATEWAY,
            Self::UnknownTransport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a transport-layer failure onto the taxonomy. Inspection order
    /// matters: redirect-loop and status errors are unambiguous, TLS problems
    /// surface as connect errors so the chain check runs first.
    pub fn from_transport(err: &reqwest::Error, url: &str) -> Self {
        if err.is_redirect() {
            return Self::TooManyRedirects(url.to_string());
        }
        if let Some(status) = err.status() {
            return Self::UpstreamHttp {
                status,
                url: url.to_string(),
            };
        }
        if chain_mentions_tls(err) {
            return Self::Tls(url.to_string());
        }
        if err.is_connect() || err.is_timeout() {
            return Self::Connection(url.to_string());
        }
        Self::UnknownTransport {
            url: url.to_string(),
            kind: transport_kind(err).to_string(),
        }
    }
}

/// Coarse category label for otherwise-unmapped reqwest errors.
fn transport_kind(err: &reqwest::Error) -> &'static str {
    if err.is_body() {
        "BodyError"
    } else if err.is_decode() {
        "DecodeError"
    } else if err.is_builder() {
        "BuilderError"
    } else if err.is_request() {
        "RequestError"
    } else {
        "TransportError"
    }
}

/// Walks the error source chain looking for TLS vocabulary. reqwest wraps
/// rustls failures inside connect errors, so the variant alone cannot tell a
/// refused socket from a failed handshake.
pub fn chain_mentions_tls(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(inner) = current {
        let text = inner.to_string().to_ascii_lowercase();
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return true;
        }
        current = inner.source();
    }
    false
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingProtocol { location, .. } => Response::builder()
                .status(StatusCode::TEMPORARY_REDIRECT)
                .header(LOCATION, location)
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
            other => {
                let status = other.status();
                let page = error_page(status, &other.to_string());
                (
                    status,
                    [("content-type", "text/html; charset=utf-8")],
                    page,
                )
                    .into_response()
            }
        }
    }
}

/// Minimal, self-contained error page. Messages are already safe HTML
/// fragments produced by this module; nothing upstream-controlled lands here
/// except the parsed URL inside `<code>` tags.
fn error_page(status: StatusCode, message: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{code} {reason}</title></head>\n\
         <body>\n<h1>{code} {reason}</h1>\n<p>{message}</p>\n</body>\n</html>\n",
        code = status.as_u16(),
        reason = status.canonical_reason().unwrap_or("Error"),
        message = message,
    )
}
