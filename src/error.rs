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

//! Error types for inventory operations.

use crate::base::ItemId;
use thiserror::Error;

/// Inventory operation errors.
///
/// All of these are expected outcomes of normal operation. None of them
/// indicate corrupted store state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Username is empty
    #[error("username must not be empty")]
    InvalidArgument,

    /// No catalog item has the requested id
    #[error("item {0} not found")]
    NotFound(ItemId),

    /// Item is lent out to someone
    #[error("item already borrowed by {borrower}")]
    AlreadyBorrowed { borrower: String },

    /// Return of an item that is not lent out
    #[error("item is not borrowed")]
    NotBorrowed,

    /// Return by someone other than the current borrower
    #[error("item is borrowed by another user")]
    WrongBorrower,

    /// Caller would wait on an item they hold themselves
    #[error("user is waiting for an item they hold")]
    SelfDeadlock,
}
