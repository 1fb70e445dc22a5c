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

//! Connection dispatcher.
//!
//! Accepts TCP connections and serves each one with its own [`Session`] on a
//! supervised tokio task, all sharing one [`InventoryStore`].

use crate::activity::ActivityLog;
use crate::inventory::InventoryStore;
use crate::session::{self, Session};
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Tunables for [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Sessions served at once; further peers wait in the listen backlog.
    pub max_connections: usize,
}

impl ServerConfig {
    pub const DEFAULT_MAX_CONNECTIONS: usize = 256;
    /// Largest accepted `max_connections`.
    pub const MAX_CONNECTIONS_LIMIT: usize = Semaphore::MAX_PERMITS;
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    store: Arc<InventoryStore>,
    activity: ActivityLog,
    config: ServerConfig,
}

impl Server {
    pub fn new(
        listener: TcpListener,
        store: Arc<InventoryStore>,
        activity: ActivityLog,
        config: ServerConfig,
    ) -> Self {
        Self {
            listener,
            store,
            activity,
            config,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    /// Accepts connections until `shutdown` resolves, then aborts every
    /// session still running and waits for them to finish.
    ///
    /// # Errors
    ///
    /// Fails if `max_connections` is zero or above
    /// [`ServerConfig::MAX_CONNECTIONS_LIMIT`].
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            store,
            activity,
            config,
        } = self;
        anyhow::ensure!(
            (1..=ServerConfig::MAX_CONNECTIONS_LIMIT).contains(&config.max_connections),
            "max_connections must be between 1 and {}, got {}",
            ServerConfig::MAX_CONNECTIONS_LIMIT,
            config.max_connections
        );
        let limit = Arc::new(Semaphore::new(config.max_connections));
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            reap_finished(&mut sessions);

            let permit = select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&limit).acquire_owned() => {
                    permit.context("connection limiter closed")?
                }
            };

            select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let store = Arc::clone(&store);
                        let activity = activity.clone();
                        sessions.spawn(serve_connection(stream, peer, store, activity, permit));
                    }
                    Err(error) => warn!(?error, "failed to accept connection"),
                },
            }
        }

        info!(active = sessions.len(), "server shutting down");
        sessions.shutdown().await;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(?error, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn reap_finished(sessions: &mut JoinSet<()>) {
    while let Some(finished) = sessions.try_join_next() {
        if let Err(error) = finished {
            if error.is_panic() {
                warn!(?error, "session task panicked");
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<InventoryStore>,
    activity: ActivityLog,
    _permit: OwnedSemaphorePermit,
) {
    info!(%peer, "client connected");
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut session = Session::new(store, activity, Some(peer));

    match session::run(&mut session, &mut reader, &mut writer).await {
        Ok(()) => info!(%peer, user = ?session.username(), "client disconnected"),
        Err(error) => warn!(%peer, user = ?session.username(), %error, "connection dropped"),
    }

    if let Err(error) = writer.shutdown().await {
        debug!(%peer, ?error, "failed to shut down connection cleanly");
    }
}
