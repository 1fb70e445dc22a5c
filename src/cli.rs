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

//! Command-line interface.

use crate::server::ServerConfig;
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Equipment lending server - lend a fixed catalog of items over TCP
///
/// Users identify with `HELLO <name>` and then `LIST`, `BORROW <id>`,
/// `RETURN <id>` or `WAIT <id>` until they `QUIT`.
#[derive(Parser, Debug)]
#[command(name = "equipment-lending")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the lending server.
    Serve(ServeArgs),
    /// Connect to a server and type commands interactively.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:5555")]
    pub listen: SocketAddr,

    /// Maximum number of clients served at once.
    #[arg(
        long,
        default_value_t = ServerConfig::DEFAULT_MAX_CONNECTIONS,
        value_parser = RangedU64ValueParser::<usize>::new()
            .range(1..=ServerConfig::MAX_CONNECTIONS_LIMIT as u64)
    )]
    pub max_connections: usize,

    /// Append user activity to this CSV file.
    #[arg(long, value_name = "FILE")]
    pub activity_log: Option<PathBuf>,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_connections: self.max_connections,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:5555")]
    pub server: SocketAddr,
}
