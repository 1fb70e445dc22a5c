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

//! Line framing over async byte streams.
//!
//! Request lines are decoded lossily: bytes that are not valid UTF-8 become
//! `U+FFFD`, so a garbled line still parses (and is rejected) like any other.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Lines read ahead while a command is pending, before reading pauses.
const MAX_QUEUED_LINES: usize = 64;

/// Delay between liveness probes once the peer has finished sending.
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Reads one line into `buf` and returns it without its terminator.
///
/// Returns `Ok(None)` once the peer has closed the stream. A final line
/// without a terminator is still returned.
pub async fn read_line<'a, R>(reader: &mut R, buf: &'a mut String) -> io::Result<Option<&'a str>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut bytes = Vec::new();
    if reader.read_until(b'\n', &mut bytes).await? == 0 {
        return Ok(None);
    }
    buf.push_str(&String::from_utf8_lossy(&bytes));
    Ok(Some(buf.trim_end_matches(LINE_ENDINGS)))
}

/// Writes each line followed by `\n`, then flushes once.
pub async fn write_lines<W, I, S>(writer: &mut W, lines: I) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut encoded = Vec::new();
    for line in lines {
        encoded.extend_from_slice(line.as_ref().as_bytes());
        encoded.push(b'\n');
    }
    writer.write_all(&encoded).await?;
    writer.flush().await
}

/// Writes a single line followed by `\n`.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_lines(writer, [line]).await
}

/// Request reader that keeps watching the connection while a command runs.
///
/// End of input is a half-close, not a hang-up: the peer may still be
/// reading responses. A connection counts as torn down only when a read
/// fails or, once input has ended, when a zero-length write to the peer
/// fails.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    partial: Vec<u8>,
    queued: VecDeque<String>,
    input_ended: bool,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            queued: VecDeque::new(),
            input_ended: false,
        }
    }

    /// Returns the next request line, queued lines first.
    ///
    /// Returns `Ok(None)` once input has ended and the queue is drained.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.queued.pop_front() {
            return Ok(Some(line));
        }
        if self.input_ended {
            return Ok(None);
        }
        self.read_one().await
    }

    /// Resolves once the connection is torn down; otherwise never resolves.
    ///
    /// Lines that arrive in the meantime are queued for [`next_line`](Self::next_line).
    /// Cancel safe: dropping the future loses no input.
    pub async fn torn_down<W>(&mut self, writer: &mut W)
    where
        W: AsyncWrite + Unpin,
    {
        while !self.input_ended && self.queued.len() < MAX_QUEUED_LINES {
            match self.read_one().await {
                Ok(Some(line)) => self.queued.push_back(line),
                Ok(None) => break,
                Err(error) => {
                    debug!(%error, "read failed with a command pending");
                    return;
                }
            }
        }

        let mut probes = tokio::time::interval(PROBE_INTERVAL);
        loop {
            probes.tick().await;
            let probe = poll_fn(|cx| Pin::new(&mut *writer).poll_write(cx, &[])).await;
            if let Err(error) = probe {
                debug!(%error, "peer stopped accepting responses");
                return;
            }
        }
    }

    async fn read_one(&mut self) -> io::Result<Option<String>> {
        // Bytes from a cancelled read are still in `partial`.
        let read = self.reader.read_until(b'\n', &mut self.partial).await?;
        if read == 0 {
            self.input_ended = true;
            if self.partial.is_empty() {
                return Ok(None);
            }
        }
        let line = String::from_utf8_lossy(&self.partial)
            .trim_end_matches(LINE_ENDINGS)
            .to_string();
        self.partial.clear();
        Ok(Some(line))
    }
}
