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

use std::path::PathBuf;

use clap::Parser;
use portalgate::{app::GatewayApp, config::GatewayConfig, utils::init_tracing};

/// Command-line interface definition using clap's derive API.
///
/// Minimal surface area: only expose the configuration file path and logging
/// format. All behavioral config (bind address, public origin, passthrough
/// rules, telemetry) lives in TOML.
#[derive(Debug, Parser)]
#[command(
    name = "portalgate",
    about = "Portalgate: same-origin forwarding gateway"
)]
struct Cli {
    /// Path to the portalgate configuration file (TOML format).
    ///
    /// Default: config/portalgate.example.toml (ships with the repo)
    #[arg(short, long, default_value = "config/portalgate.example.toml")]
    config: PathBuf,

    /// Enable JSON-formatted logs (default: human-readable stdout).
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

/// Application entry point: parse CLI, initialize logging, load config, run server.
///
/// Startup Sequence:
/// 1. Parse command-line arguments (clap validates types, required fields, etc.)
/// 2. Initialize tracing subscriber (stdout or JSON, based on --json-logs flag)
/// 3. Load TOML configuration file (validates schema, derives the origin map)
/// 4. Create GatewayApp (builds the upstream pipe, rewrite pipeline, router)
/// 5. Run the app (binds listener, serves until process exit)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging (must happen before any tracing:: calls)
    init_tracing(cli.json_logs);

    let config = GatewayConfig::load(&cli.config)?;

    let app = GatewayApp::new(config)?;

    app.run().await
}
