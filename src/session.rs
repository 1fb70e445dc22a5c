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

//! Per-connection protocol state machine.
//!
//! ```text
//!  Unauthenticated ──HELLO <user>──► Authenticated ──QUIT──► Closed
//!        │                                                     ▲
//!        └───────────────────────QUIT──────────────────────────┘
//! ```
//!
//! A [`Session`] turns request lines into [`InventoryStore`] calls and maps
//! every outcome to a [`Response`]. [`run`] drives one session over a
//! connection until the peer quits or disconnects.

use crate::activity::{ActivityEvent, ActivityLog};
use crate::base::ItemId;
use crate::inventory::InventoryStore;
use crate::protocol::{Command, Rejected, Response};
use crate::transport::{LineReader, write_lines};
use crate::InventoryError;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Authentication state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { username: String },
    Closed,
}

/// Failures that end a session without a response.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The store reported an outcome this command never produces.
    #[error("unexpected outcome of {command}: {source}")]
    Unexpected {
        command: &'static str,
        #[source]
        source: InventoryError,
    },

    /// Reading from or writing to the connection failed.
    #[error("connection i/o failed")]
    Io(#[from] io::Error),
}

/// One connection's view of the shared inventory.
#[derive(Debug)]
pub struct Session {
    store: Arc<InventoryStore>,
    activity: ActivityLog,
    peer: Option<SocketAddr>,
    state: SessionState,
}

impl Session {
    pub fn new(store: Arc<InventoryStore>, activity: ActivityLog, peer: Option<SocketAddr>) -> Self {
        Self {
            store,
            activity,
            peer,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { username } => Some(username),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Handles one request line.
    ///
    /// `WAIT` may suspend indefinitely. Dropping the future cancels it
    /// without side effects on the store.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unexpected`] when the store fails in a way the
    /// protocol has no response for; the connection must then be dropped.
    pub async fn handle_line(&mut self, line: &str) -> Result<Response, SessionError> {
        match Command::parse(line) {
            Ok(command) => self.dispatch(command).await,
            // Blank lines and a bare HELLO are answered in any state.
            Err(rejected @ (Rejected::Empty | Rejected::MissingUsername)) => Ok(rejected.into()),
            Err(rejected) => match self.state {
                SessionState::Authenticated { .. } => Ok(rejected.into()),
                _ => Ok(Response::NotAuthenticated),
            },
        }
    }

    /// Executes a parsed command against the store.
    pub async fn dispatch(&mut self, command: Command) -> Result<Response, SessionError> {
        match (command, self.username().map(str::to_string)) {
            (Command::Hello { username }, _) => Ok(self.hello(&username)),
            (Command::Quit, _) => {
                self.state = SessionState::Closed;
                Ok(Response::Bye)
            }
            (_, None) => Ok(Response::NotAuthenticated),
            (Command::List, Some(_)) => Ok(Response::List(self.store.list_items())),
            (Command::Borrow { id }, Some(username)) => self.borrow(id, &username),
            (Command::Return { id }, Some(username)) => self.return_item(id, &username),
            (Command::Wait { id }, Some(username)) => self.wait(id, &username).await,
        }
    }

    fn hello(&mut self, username: &str) -> Response {
        // The first identity sticks for the lifetime of the connection.
        if self.state == SessionState::Unauthenticated {
            info!(peer = ?self.peer, user = username, "user authenticated");
            self.state = SessionState::Authenticated {
                username: username.to_string(),
            };
            self.record(ActivityEvent::Hello, None);
        }
        Response::Hello
    }

    fn borrow(&self, id: ItemId, username: &str) -> Result<Response, SessionError> {
        match self.store.borrow_item(id, username) {
            Ok(()) => {
                self.record(ActivityEvent::Borrowed, Some(id));
                Ok(Response::Borrowed(id))
            }
            Err(InventoryError::NotFound(_)) => Ok(Response::NotFound),
            Err(InventoryError::AlreadyBorrowed { borrower }) => {
                Ok(Response::Unavailable { borrower })
            }
            Err(source) => Err(SessionError::Unexpected {
                command: "BORROW",
                source,
            }),
        }
    }

    fn return_item(&self, id: ItemId, username: &str) -> Result<Response, SessionError> {
        match self.store.return_item(id, username) {
            Ok(()) => {
                self.record(ActivityEvent::Returned, Some(id));
                Ok(Response::Returned(id))
            }
            Err(InventoryError::NotFound(_)) => Ok(Response::NotFound),
            Err(InventoryError::WrongBorrower | InventoryError::NotBorrowed) => {
                Ok(Response::NotOwner)
            }
            Err(source) => Err(SessionError::Unexpected {
                command: "RETURN",
                source,
            }),
        }
    }

    async fn wait(&self, id: ItemId, username: &str) -> Result<Response, SessionError> {
        let outcome = match self.store.check_wait(id, username) {
            Ok(_) => {
                self.record(ActivityEvent::WaitStarted, Some(id));
                self.store.wait_until_available(id, username).await
            }
            Err(error) => Err(error),
        };
        match outcome {
            Ok(()) => {
                self.record(ActivityEvent::WaitResolved, Some(id));
                Ok(Response::Available(id))
            }
            Err(InventoryError::NotFound(_)) => Ok(Response::NotFound),
            Err(InventoryError::SelfDeadlock) => Ok(Response::Deadlock),
            Err(source) => Err(SessionError::Unexpected {
                command: "WAIT",
                source,
            }),
        }
    }

    fn record(&self, event: ActivityEvent, item: Option<ItemId>) {
        self.activity.record(self.peer, self.username(), event, item);
    }
}

/// Serves one connection until the peer quits or disconnects.
///
/// Requests are answered in order. A read failure or end of input closes the
/// session once every queued request has been answered. While a command is
/// pending (a blocked `WAIT`), the connection is watched: a peer that only
/// half-closes still gets its response, a torn-down connection releases the
/// waiter at once.
///
/// # Errors
///
/// Returns the error that forced the connection to drop.
pub async fn run<R, W>(session: &mut Session, reader: &mut R, writer: &mut W) -> Result<(), SessionError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    session.record(ActivityEvent::Connected, None);
    let outcome = serve(session, &mut LineReader::new(reader), writer).await;
    session.record(ActivityEvent::Disconnected, None);
    outcome
}

async fn serve<R, W>(
    session: &mut Session,
    lines: &mut LineReader<R>,
    writer: &mut W,
) -> Result<(), SessionError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let peer = session.peer;

    while !session.is_closed() {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(?peer, "peer finished sending");
                break;
            }
            Err(error) => {
                debug!(?peer, %error, "read failed; closing session");
                break;
            }
        };

        let response = {
            let pending = session.handle_line(&line);
            tokio::pin!(pending);
            tokio::select! {
                biased;
                response = &mut pending => response?,
                () = lines.torn_down(writer) => {
                    debug!(?peer, command = %line, "connection torn down with a command pending");
                    break;
                }
            }
        };

        if let Err(error) = write_lines(writer, response.lines()).await {
            warn!(%error, "failed to send response");
            return Err(error.into());
        }
    }

    Ok(())
}
