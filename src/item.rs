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

//! Catalog item state.
//!
//! # Example
//!
//! ```
//! use equipment_lending::{ItemId, ItemRecord};
//!
//! let mut item = ItemRecord::new(ItemId(1), "Camera");
//! item.borrow("alice").unwrap();
//! assert_eq!(item.to_string(), "1 Camera BORROWED by=alice");
//! ```

use crate::InventoryError;
use crate::base::ItemId;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//  FREE ──borrow(user)──► BORROWED by=user ──return_back(user)──► FREE
//
// `borrower` is `Some` exactly when the item is lent out, so a free item can
// never carry a stale borrower name.

/// One catalog entry and its borrow status.
///
/// Carries no lock of its own; the store serializes every access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    id: ItemId,
    name: String,
    borrower: Option<String>,
}

impl ItemRecord {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            borrower: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current borrower, or `""` when the item is free.
    pub fn borrower(&self) -> &str {
        self.borrower.as_deref().unwrap_or("")
    }

    pub fn is_available(&self) -> bool {
        self.borrower.is_none()
    }

    /// Returns true if `username` currently holds this item.
    pub fn is_held_by(&self, username: &str) -> bool {
        self.borrower.as_deref() == Some(username)
    }

    /// Lends the item to `username`.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidArgument`] - `username` is empty.
    /// - [`InventoryError::AlreadyBorrowed`] - someone holds the item; carries their name.
    pub fn borrow(&mut self, username: &str) -> Result<(), InventoryError> {
        if username.is_empty() {
            return Err(InventoryError::InvalidArgument);
        }
        if let Some(borrower) = &self.borrower {
            return Err(InventoryError::AlreadyBorrowed {
                borrower: borrower.clone(),
            });
        }
        self.borrower = Some(username.to_string());
        Ok(())
    }

    /// Takes the item back from `username`.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidArgument`] - `username` is empty.
    /// - [`InventoryError::NotBorrowed`] - the item is free.
    /// - [`InventoryError::WrongBorrower`] - someone else holds the item.
    pub fn return_back(&mut self, username: &str) -> Result<(), InventoryError> {
        if username.is_empty() {
            return Err(InventoryError::InvalidArgument);
        }
        match &self.borrower {
            None => Err(InventoryError::NotBorrowed),
            Some(borrower) if borrower != username => Err(InventoryError::WrongBorrower),
            Some(_) => {
                self.borrower = None;
                Ok(())
            }
        }
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            name: self.name.clone(),
            borrower: self.borrower.clone(),
        }
    }
}

impl fmt::Display for ItemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(f, self.id, &self.name, self.borrower.as_deref())
    }
}

/// Point-in-time copy of an item, taken under the store lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub name: String,
    pub borrower: Option<String>,
}

impl ItemSnapshot {
    pub fn is_borrowed(&self) -> bool {
        self.borrower.is_some()
    }
}

impl fmt::Display for ItemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(f, self.id, &self.name, self.borrower.as_deref())
    }
}

fn render(f: &mut fmt::Formatter<'_>, id: ItemId, name: &str, borrower: Option<&str>) -> fmt::Result {
    match borrower {
        Some(borrower) => write!(f, "{id} {name} BORROWED by={borrower}"),
        None => write!(f, "{id} {name} FREE"),
    }
}

/// Error parsing a rendered item line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed item line: {0:?}")]
pub struct ParseItemError(String);

impl FromStr for ItemSnapshot {
    type Err = ParseItemError;

    /// Parses `"<id> <name> FREE"` or `"<id> <name> BORROWED by=<borrower>"`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseItemError(line.to_string());
        let mut tokens = line.split_ascii_whitespace();

        let id = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(malformed)?;
        let name = tokens.next().ok_or_else(malformed)?.to_string();
        let borrower = match (tokens.next(), tokens.next()) {
            (Some("FREE"), None) => None,
            (Some("BORROWED"), Some(by)) => {
                let borrower = by.strip_prefix("by=").filter(|b| !b.is_empty());
                Some(borrower.ok_or_else(malformed)?.to_string())
            }
            _ => return Err(malformed()),
        };
        if tokens.next().is_some() {
            return Err(malformed());
        }

        Ok(ItemSnapshot { id, name, borrower })
    }
}
