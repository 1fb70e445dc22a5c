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

//! Interactive command-line client.
//!
//! Prompts with `> `, sends each line typed on stdin to the server and prints the response.
//! `LIST` responses are followed by as many item lines as the header says.

use crate::cli::ClientArgs;
use crate::item::ItemSnapshot;
use crate::protocol::parse_list_header;
use crate::transport::{read_line, write_line};
use anyhow::{Context, Result};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

const PROMPT: &str = "> ";

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut stdout = io::stdout();
    print(&mut stdout, &format!("Connected to server at {}", args.server)).await?;
    print(
        &mut stdout,
        "Type your commands (HELLO, LIST, BORROW, RETURN, WAIT, QUIT):",
    )
    .await?;

    let mut stdin = BufReader::new(io::stdin());
    converse(&mut stdin, &mut reader, &mut writer, &mut stdout).await?;

    if let Err(error) = writer.shutdown().await {
        debug!(?error, "failed to shut down connection cleanly");
    }
    print(&mut stdout, "Connection closed").await?;
    Ok(())
}

/// Relays commands from `input` to the server and responses to `output`.
///
/// Ends on `OK BYE`, server disconnect, or end of input.
pub async fn converse<I, R, W, O>(
    input: &mut I,
    reader: &mut R,
    writer: &mut W,
    output: &mut O,
) -> Result<()>
where
    I: AsyncBufRead + Unpin,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut command = String::new();
    let mut response = String::new();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        command.clear();
        if input.read_line(&mut command).await? == 0 {
            return Ok(());
        }
        let command = command.trim();
        if command.is_empty() {
            continue;
        }

        write_line(writer, command)
            .await
            .context("failed to send command")?;

        let Some(line) = read_line(reader, &mut response).await? else {
            print(output, "Disconnected from server").await?;
            return Ok(());
        };
        let line = line.to_string();
        print(output, &line).await?;

        if let Some(count) = parse_list_header(&line) {
            for _ in 0..count {
                let Some(item) = read_line(reader, &mut response).await? else {
                    print(output, "Disconnected from server").await?;
                    return Ok(());
                };
                let rendered = match item.parse::<ItemSnapshot>() {
                    Ok(snapshot) => snapshot.to_string(),
                    Err(_) => item.to_string(),
                };
                print(output, &rendered).await?;
            }
        }

        if line.starts_with("OK BYE") {
            return Ok(());
        }
    }
}

async fn print<O>(output: &mut O, line: &str) -> io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
