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

//! End-to-end tests of the response rewrite pipeline over synthetic upstream
//! responses: header relay, Location rewriting, cookie mapping, CORS
//! enforcement, and CSP widening, all running in their production order.

use http::{
    header::{
        HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN,
        LOCATION, SET_COOKIE,
    },
    Method, StatusCode, Uri,
};
use portalgate::config::{OriginMap, ServerConfig};
use portalgate::gateway::{
    context::{RequestContext, MODE_HEADER, ORIGIN_HEADER},
    flow::{Exchange, UpstreamParts},
    stages::RewritePipeline,
};
use url::Url;

fn origins() -> OriginMap {
    OriginMap::derive(&ServerConfig {
        bind_address: "127.0.0.1".into(),
        bind_port: 8000,
        public_origin: "https://portal.example.com".into(),
    })
    .expect("origin map")
}

fn ctx(origins: &OriginMap, declared_origin: Option<&str>) -> RequestContext {
    let mut headers = HeaderMap::new();
    if let Some(declared) = declared_origin {
        headers.insert(ORIGIN_HEADER, HeaderValue::from_str(declared).expect("hdr"));
        headers.insert(MODE_HEADER, HeaderValue::from_static("cors"));
    }
    let uri: Uri = "/https://example.com/start".parse().expect("uri");
    RequestContext::from_parts(origins, Method::GET, &uri, headers)
}

fn upstream(status: StatusCode, headers: HeaderMap) -> UpstreamParts {
    UpstreamParts {
        final_url: Url::parse("https://example.com/start").expect("url"),
        status,
        headers,
    }
}

#[tokio::test]
async fn redirects_stay_inside_the_tunnel() {
    let origins = origins();
    let ctx = ctx(&origins, None);
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static("/next"));
    let mut exchange = Exchange::new(&ctx, &origins, upstream(StatusCode::FOUND, headers));

    RewritePipeline::build()
        .process(&mut exchange)
        .await
        .expect("pipeline");

    assert_eq!(exchange.response.status, StatusCode::FOUND);
    assert_eq!(
        exchange
            .response
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("https://portal.example.com/https://example.com/next")
    );
}

#[tokio::test]
async fn cookies_are_re_scoped_to_the_gateway() {
    let origins = origins();
    let ctx = ctx(&origins, None);
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("session=abc; Domain=example.com; Path=/; Secure"),
    );
    headers.append(SET_COOKIE, HeaderValue::from_static("pref=dark"));
    let mut exchange = Exchange::new(&ctx, &origins, upstream(StatusCode::OK, headers));

    RewritePipeline::build()
        .process(&mut exchange)
        .await
        .expect("pipeline");

    let cookies: Vec<&str> = exchange
        .response
        .headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].contains("Domain=portal.example.com"));
    assert!(cookies[0].contains("Path=https://example.com"));
    assert!(cookies[0].contains("Secure"));
    assert!(!cookies[1].contains("Domain"));
}

#[tokio::test]
async fn matching_cors_grant_is_retargeted() {
    let origins = origins();
    let ctx = ctx(&origins, Some("https://site-a.com"));
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("https://site-a.com"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    let mut exchange = Exchange::new(&ctx, &origins, upstream(StatusCode::OK, headers));

    RewritePipeline::build()
        .process(&mut exchange)
        .await
        .expect("pipeline");

    assert_eq!(
        exchange
            .response
            .headers
            .get(ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://portal.example.com")
    );
    assert!(exchange
        .response
        .headers
        .get(ACCESS_CONTROL_ALLOW_CREDENTIALS)
        .is_some());
}

#[tokio::test]
async fn cors_grants_vanish_without_a_recorded_origin() {
    let origins = origins();
    let ctx = ctx(&origins, None);
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    let mut exchange = Exchange::new(&ctx, &origins, upstream(StatusCode::OK, headers));

    RewritePipeline::build()
        .process(&mut exchange)
        .await
        .expect("pipeline");

    assert!(exchange
        .response
        .headers
        .get(ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
    assert!(exchange
        .response
        .headers
        .get(ACCESS_CONTROL_ALLOW_CREDENTIALS)
        .is_none());
}

#[tokio::test]
async fn csp_admits_the_gateway_as_a_source() {
    let origins = origins();
    let ctx = ctx(&origins, None);
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'self'; object-src 'none'"),
    );
    let mut exchange = Exchange::new(&ctx, &origins, upstream(StatusCode::OK, headers));

    RewritePipeline::build()
        .process(&mut exchange)
        .await
        .expect("pipeline");

    assert_eq!(
        exchange
            .response
            .headers
            .get("content-security-policy")
            .and_then(|v| v.to_str().ok()),
        Some("default-src 'self' https://portal.example.com; object-src 'none'")
    );
}

#[tokio::test]
async fn running_the_pipeline_twice_yields_identical_headers() {
    let origins = origins();
    let ctx = ctx(&origins, Some("https://site-a.com"));
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static("/next"));
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("session=abc; Domain=example.com; Path=/app"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("https://site-a.com"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("script-src 'self'"),
    );
    let mut exchange = Exchange::new(&ctx, &origins, upstream(StatusCode::FOUND, headers));

    let pipeline = RewritePipeline::build();
    pipeline.process(&mut exchange).await.expect("first run");
    let first = exchange.response.headers.clone();
    pipeline.process(&mut exchange).await.expect("second run");

    assert_eq!(first, exchange.response.headers);
}
