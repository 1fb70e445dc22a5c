// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use clap::Parser;
use equipment_lending::cli::{Cli, Command, ServeArgs};
use equipment_lending::{ActivityLog, InventoryStore, Server, client};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let (activity, writer) = match &args.activity_log {
        Some(path) => {
            let (log, writer) = ActivityLog::open(path)
                .with_context(|| format!("failed to open activity log '{}'", path.display()))?;
            (log, Some(writer))
        }
        None => (ActivityLog::disabled(), None),
    };

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    let store = Arc::new(InventoryStore::new());
    let server = Server::new(listener, store, activity, args.server_config());
    let addr = server.local_addr()?;

    // Printed on stdout so scripts can discover an ephemeral port.
    println!("listening on {addr}");
    info!(%addr, items = server.store().len(), "server started");

    let outcome = server.run_until_ctrl_c().await;
    if let Err(error) = &outcome {
        warn!("server exited with error: {error:?}");
    }

    // The server owned the last log handles; the writer drains and exits.
    if let Some(writer) = writer {
        tokio::task::spawn_blocking(move || writer.join())
            .await
            .context("activity log writer task failed")?;
    }

    outcome
}
