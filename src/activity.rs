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

//! Append-only activity log.
//!
//! Sessions record what users do (connect, borrow, return, wait) through a
//! cheap [`ActivityLog`] handle. Records travel over a channel to a writer
//! thread that appends them as CSV rows, so a slow or failing log file never
//! delays or fails a client request.
//!
//! # CSV Format
//!
//! Columns: `timestamp_ms, peer, user, event, item` (no header row, since the
//! file is appended to across restarts).
//!
//! ```csv
//! 1760870400000,127.0.0.1:50512,alice,borrowed,1
//! 1760870400250,127.0.0.1:50514,bob,wait_started,1
//! ```

use crate::base::ItemId;
use crossbeam::channel::{self, Receiver, Sender};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Kinds of recorded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEvent {
    Connected,
    Hello,
    Borrowed,
    Returned,
    WaitStarted,
    WaitResolved,
    Disconnected,
}

/// One row of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub timestamp_ms: u64,
    pub peer: Option<SocketAddr>,
    pub user: Option<String>,
    pub event: ActivityEvent,
    pub item: Option<ItemId>,
}

/// Handle for recording activity.
///
/// Cloning is cheap. A disabled log drops every record.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    sender: Option<Sender<ActivityRecord>>,
}

/// Owns the writer thread of an [`ActivityLog`].
///
/// The thread exits once every [`ActivityLog`] clone has been dropped.
#[derive(Debug)]
pub struct ActivityWriter {
    handle: JoinHandle<()>,
}

impl ActivityWriter {
    /// Waits for the writer thread to drain and flush outstanding records.
    ///
    /// Blocks until every [`ActivityLog`] handle is gone.
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("activity log writer panicked");
        }
    }
}

impl ActivityLog {
    /// Creates a log that discards every record.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Opens (or creates) `path` for appending and starts the writer thread.
    pub fn open(path: impl AsRef<Path>) -> io::Result<(Self, ActivityWriter)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::spawn(file)
    }

    /// Starts a writer thread appending CSV rows to `output`.
    pub fn spawn<W>(output: W) -> io::Result<(Self, ActivityWriter)>
    where
        W: Write + Send + 'static,
    {
        let (sender, receiver) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("activity-log".into())
            .spawn(move || write_records(receiver, output))?;
        Ok((
            Self {
                sender: Some(sender),
            },
            ActivityWriter { handle },
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Records one event. Never blocks and never fails.
    pub fn record(
        &self,
        peer: Option<SocketAddr>,
        user: Option<&str>,
        event: ActivityEvent,
        item: Option<ItemId>,
    ) {
        let Some(sender) = &self.sender else {
            return;
        };
        let record = ActivityRecord {
            timestamp_ms: now_ms(),
            peer,
            user: user.map(str::to_string),
            event,
            item,
        };
        if sender.send(record).is_err() {
            warn!(?event, "activity log writer is gone; dropping record");
        }
    }
}

fn write_records<W: Write>(receiver: Receiver<ActivityRecord>, output: W) {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(output);
    for record in receiver {
        if let Err(error) = writer.serialize(&record) {
            warn!(%error, "failed to write activity record");
            continue;
        }
        if let Err(error) = writer.flush() {
            warn!(%error, "failed to flush activity log");
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
