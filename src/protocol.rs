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

//! Wire protocol.
//!
//! Requests are single ASCII lines: a case-sensitive command name followed by
//! whitespace-separated arguments. Responses are one line, except `LIST`
//! which sends a header line followed by one line per item.

use crate::base::ItemId;
use crate::item::ItemSnapshot;
use std::fmt;

/// A request line that parsed into a known command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello { username: String },
    List,
    Borrow { id: ItemId },
    Return { id: ItemId },
    Wait { id: ItemId },
    Quit,
}

/// A request line that did not parse.
///
/// Commands that take an item id are recognized even when the id is missing
/// or malformed, so the session can check authentication before reporting
/// the bad id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    /// Blank line.
    Empty,
    /// `HELLO` without a username.
    MissingUsername,
    /// `BORROW`, `RETURN` or `WAIT` without a valid integer id.
    InvalidId,
    /// Unknown command name.
    Unknown,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, Rejected> {
        let mut tokens = line.split_ascii_whitespace();
        let Some(name) = tokens.next() else {
            return Err(Rejected::Empty);
        };
        let argument = tokens.next();

        let item_id = || -> Result<ItemId, Rejected> {
            argument
                .and_then(|token| token.parse().ok())
                .ok_or(Rejected::InvalidId)
        };

        match name {
            "HELLO" => argument
                .map(|username| Command::Hello {
                    username: username.to_string(),
                })
                .ok_or(Rejected::MissingUsername),
            "LIST" => Ok(Command::List),
            "BORROW" => item_id().map(|id| Command::Borrow { id }),
            "RETURN" => item_id().map(|id| Command::Return { id }),
            "WAIT" => item_id().map(|id| Command::Wait { id }),
            "QUIT" => Ok(Command::Quit),
            _ => Err(Rejected::Unknown),
        }
    }

    /// Command name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Hello { .. } => "HELLO",
            Command::List => "LIST",
            Command::Borrow { .. } => "BORROW",
            Command::Return { .. } => "RETURN",
            Command::Wait { .. } => "WAIT",
            Command::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Hello { username } => write!(f, "HELLO {username}"),
            Command::Borrow { id } | Command::Return { id } | Command::Wait { id } => {
                write!(f, "{} {id}", self.name())
            }
            Command::List | Command::Quit => f.write_str(self.name()),
        }
    }
}

/// A server response.
///
/// `Display` renders the exact wire text without the final line terminator;
/// a [`Response::List`] renders as several `\n`-separated lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Hello,
    List(Vec<ItemSnapshot>),
    Borrowed(ItemId),
    Returned(ItemId),
    Available(ItemId),
    Bye,
    NotFound,
    Unavailable { borrower: String },
    NotOwner,
    Deadlock,
    NotAuthenticated,
    MissingUsername,
    InvalidId,
    InvalidCommand,
    EmptyCommand,
}

impl Response {
    /// Wire lines of this response, in order.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Response::List(items) => std::iter::once(format!("OK LIST {}", items.len()))
                .chain(items.iter().map(ToString::to_string))
                .collect(),
            other => vec![other.to_string()],
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            Response::Hello
                | Response::List(_)
                | Response::Borrowed(_)
                | Response::Returned(_)
                | Response::Available(_)
                | Response::Bye
        )
    }
}

impl From<Rejected> for Response {
    fn from(rejected: Rejected) -> Self {
        match rejected {
            Rejected::Empty => Response::EmptyCommand,
            Rejected::MissingUsername => Response::MissingUsername,
            Rejected::InvalidId => Response::InvalidId,
            Rejected::Unknown => Response::InvalidCommand,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Hello => f.write_str("OK HELLO"),
            Response::List(_) => f.write_str(&self.lines().join("\n")),
            Response::Borrowed(id) => write!(f, "OK BORROWED{id}"),
            Response::Returned(id) => write!(f, "OK RETURNED{id}"),
            Response::Available(id) => write!(f, "OK AVAILABLE {id}"),
            Response::Bye => f.write_str("OK BYE"),
            Response::NotFound => f.write_str("ERR NOT_FOUND item"),
            Response::Unavailable { borrower } => write!(f, "ERR UNAVAILABLE borrowed_by={borrower}"),
            Response::NotOwner => f.write_str("ERR PERMISSION not_owner"),
            Response::Deadlock => f.write_str("ERR DEADLOCK item"),
            Response::NotAuthenticated => f.write_str("ERR STATE not_authenticated"),
            Response::MissingUsername => f.write_str("ERR PROTOCOL missing_username"),
            Response::InvalidId => f.write_str("ERR PROTOCOL invalid_id"),
            Response::InvalidCommand => f.write_str("ERR PROTOCOL invalid_command"),
            Response::EmptyCommand => f.write_str("ERR PROTOCOL command_invalid"),
        }
    }
}

/// Parses a `LIST` header line, returning the number of item lines that follow.
pub fn parse_list_header(line: &str) -> Option<usize> {
    line.strip_prefix("OK LIST ")?.trim().parse().ok()
}
