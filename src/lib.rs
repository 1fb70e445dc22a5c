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

//! # Equipment Lending
//!
//! This library lends a fixed catalog of physical items (camera, laptop, ...)
//! to named users over a line-oriented TCP protocol. An item has at most one
//! borrower at a time, and a client may block until an item it wants is free.
//!
//! ## Core Components
//!
//! - [`InventoryStore`]: Shared catalog with atomic borrow/return/list and blocking waits
//! - [`ItemRecord`]: One catalog entry and its borrow status
//! - [`Session`]: Per-connection protocol state machine
//! - [`Server`]: Accept loop running one session per connection
//! - [`InventoryError`]: Error types for inventory operations
//!
//! ## Example
//!
//! ```
//! use equipment_lending::{InventoryError, InventoryStore, ItemId};
//!
//! let store = InventoryStore::new();
//!
//! // Borrow the camera
//! store.borrow_item(ItemId(1), "alice").unwrap();
//!
//! // Nobody else can take it until alice returns it
//! assert_eq!(
//!     store.borrow_item(ItemId(1), "bob"),
//!     Err(InventoryError::AlreadyBorrowed { borrower: "alice".into() })
//! );
//! store.return_item(ItemId(1), "alice").unwrap();
//! store.borrow_item(ItemId(1), "bob").unwrap();
//! ```
//!
//! ## Thread Safety
//!
//! The store serializes every operation with one lock that is never held
//! across I/O. Waiting clients park on a broadcast signal that every return
//! fires, and re-check their own item on each wake-up.

pub mod activity;
mod base;
pub mod cli;
pub mod client;
pub mod error;
mod inventory;
pub mod item;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use activity::{ActivityEvent, ActivityLog};
pub use base::ItemId;
pub use error::InventoryError;
pub use inventory::{DEFAULT_CATALOG, InventoryStore};
pub use item::{ItemRecord, ItemSnapshot};
pub use protocol::{Command, Response};
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionError, SessionState};
