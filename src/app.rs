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

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::{GatewayConfig, OriginMap};
use crate::gateway::{
    pipe::Pipe, routes::GatewayState, router, stages::RewritePipeline,
};
use crate::telemetry::TelemetrySink;

/// The assembled gateway: configuration resolved, shared state built, router
/// wired. Construction is fallible (bad public origin, client build failure);
/// `run` only fails on bind/serve errors.
pub struct GatewayApp {
    bind_address: String,
    bind_port: u16,
    state: Arc<GatewayState>,
}

impl GatewayApp {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let origins = OriginMap::derive(&config.server)?;
        let state = Arc::new(GatewayState {
            origins,
            passthrough: config.passthrough,
            pipe: Pipe::new()?,
            rewrites: RewritePipeline::build(),
            telemetry: TelemetrySink::new(config.telemetry),
        });

        Ok(Self {
            bind_address: config.server.bind_address,
            bind_port: config.server.bind_port,
            state,
        })
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.bind_address, self.bind_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        tracing::info!(
            listen = %addr,
            public_origin = %self.state.origins.main_origin,
            "portalgate listening"
        );

        axum::serve(listener, router(self.state))
            .await
            .context("server terminated")?;
        Ok(())
    }
}
