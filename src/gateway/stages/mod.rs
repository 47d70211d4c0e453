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

//! Response-rewriting stages applied to every forwarded exchange. Each stage
//! implements [`RewriteStage`] and the pipeline drives them in a fixed order:
//! the header relay must install the base headers before the cookie, CORS,
//! and CSP stages mutate them. Running the pipeline twice over the same
//! upstream parts produces identical outbound headers.

mod cookies;
mod cors;
mod csp;
mod headers;

pub use cookies::CookieRewriteStage;
pub use cors::CorsStage;
pub use csp::CspStage;
pub use headers::HeaderRelayStage;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::flow::Exchange;

#[async_trait]
pub trait RewriteStage: Send + Sync {
    async fn on_response(&self, exchange: &mut Exchange<'_>) -> Result<()>;
}

/// Represents the ordered pipeline of rewrite stages run for every exchange.
#[derive(Clone)]
pub struct RewritePipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    stages: Vec<Arc<dyn RewriteStage>>,
}

impl RewritePipeline {
    /// Builds the pipeline with deterministic ordering: header relay first
    /// (it resets the outbound header map), then cookies, CORS, CSP.
    pub fn build() -> Self {
        let stages: Vec<Arc<dyn RewriteStage>> = vec![
            Arc::new(HeaderRelayStage),
            Arc::new(CookieRewriteStage),
            Arc::new(CorsStage),
            Arc::new(CspStage),
        ];
        Self {
            inner: Arc::new(PipelineInner { stages }),
        }
    }

    pub async fn process(&self, exchange: &mut Exchange<'_>) -> Result<()> {
        for stage in &self.inner.stages {
            stage.on_response(exchange).await?;
        }
        Ok(())
    }
}
