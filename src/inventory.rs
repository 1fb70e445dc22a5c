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

//! Shared inventory store.
//!
//! The [`InventoryStore`] owns every [`ItemRecord`] of the catalog and is the
//! only way to read or change their borrow status. It is shared by all
//! connections behind an `Arc`.
//!
//! # Operations
//!
//! - **List**: Snapshot of every item in catalog order.
//! - **Borrow**: Lend a free item to a user.
//! - **Return**: Take an item back from its borrower and wake all waiters.
//! - **Wait**: Suspend until a specific item is free.
//!
//! # Thread Safety
//!
//! A single [`parking_lot::Mutex`] guards the whole catalog, so every
//! operation is atomic with respect to every other. The lock is never held
//! across an `.await` or any I/O. Waiters park on a broadcast
//! "availability changed" signal instead of holding the lock.

use crate::base::ItemId;
use crate::item::{ItemRecord, ItemSnapshot};
use crate::InventoryError;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// The built-in catalog served by default.
pub const DEFAULT_CATALOG: [(i32, &str); 15] = [
    (1, "Camera"),
    (2, "Tripod"),
    (3, "Laptop"),
    (4, "Projector"),
    (5, "Microphone"),
    (6, "Speaker"),
    (7, "HDMI_Cable"),
    (8, "Ethernet_Cable"),
    (9, "Keyboard"),
    (10, "Mouse"),
    (11, "Monitor"),
    (12, "USB_Hub"),
    (13, "Power_Bank"),
    (14, "Router"),
    (15, "VR_Headset"),
];

/// Fixed catalog of lendable items with exclusive borrowing.
///
/// # Invariants
///
/// - The set of items never changes after construction.
/// - An item has at most one borrower at any time.
/// - Every observer sees item state that was written under the lock.
/// - Every successful return is followed by one broadcast on the availability signal.
#[derive(Debug)]
pub struct InventoryStore {
    /// Catalog entries in catalog order, looked up by id.
    items: Mutex<Vec<ItemRecord>>,
    /// Generation counter bumped after every successful return.
    availability: watch::Sender<u64>,
}

impl InventoryStore {
    /// Creates a store holding the [`DEFAULT_CATALOG`], all items free.
    pub fn new() -> Self {
        Self::with_catalog(DEFAULT_CATALOG.iter().map(|&(id, name)| (ItemId(id), name)))
    }

    /// Creates a store from a caller-provided catalog.
    ///
    /// Ids are expected to be unique; if they are not, lookups resolve to the
    /// first matching entry in catalog order.
    pub fn with_catalog<I, S>(catalog: I) -> Self
    where
        I: IntoIterator<Item = (ItemId, S)>,
        S: Into<String>,
    {
        let items = catalog
            .into_iter()
            .map(|(id, name)| ItemRecord::new(id, name))
            .collect();
        let (availability, _) = watch::channel(0);
        InventoryStore {
            items: Mutex::new(items),
            availability,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Returns a snapshot of one item, or `None` if the id is unknown.
    pub fn item(&self, id: ItemId) -> Option<ItemSnapshot> {
        let items = self.items.lock();
        find(&items, id).map(ItemRecord::snapshot)
    }

    /// Returns a snapshot of every item in catalog order.
    ///
    /// The lock is held only while copying; rendering and sending the
    /// snapshot happen after it is released.
    pub fn list_items(&self) -> Vec<ItemSnapshot> {
        self.items.lock().iter().map(ItemRecord::snapshot).collect()
    }

    /// Lends item `id` to `username`.
    ///
    /// Availability only decreases here, so no waiter is woken.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - No item has this id.
    /// - [`InventoryError::AlreadyBorrowed`] - The item is lent out; carries the current borrower.
    /// - [`InventoryError::InvalidArgument`] - `username` is empty.
    pub fn borrow_item(&self, id: ItemId, username: &str) -> Result<(), InventoryError> {
        let mut items = self.items.lock();
        let item = find_mut(&mut items, id)?;
        item.borrow(username)?;
        debug!(item = %id, user = username, "item borrowed");
        Ok(())
    }

    /// Takes item `id` back from `username` and wakes every waiter.
    ///
    /// The wake-up is a broadcast: waiters for other items wake too and go
    /// back to sleep after re-checking their own item.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - No item has this id.
    /// - [`InventoryError::NotBorrowed`] - The item is free.
    /// - [`InventoryError::WrongBorrower`] - `username` is not the current borrower.
    /// - [`InventoryError::InvalidArgument`] - `username` is empty.
    pub fn return_item(&self, id: ItemId, username: &str) -> Result<(), InventoryError> {
        {
            let mut items = self.items.lock();
            let item = find_mut(&mut items, id)?;
            item.return_back(username)?;
        }
        self.availability.send_modify(|generation| *generation = generation.wrapping_add(1));
        debug!(item = %id, user = username, "item returned");
        Ok(())
    }

    /// Checks whether `username` may wait for item `id`.
    ///
    /// Returns `Ok(true)` if the item is free right now and `Ok(false)` if a
    /// wait would suspend.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - No item has this id.
    /// - [`InventoryError::SelfDeadlock`] - `username` holds the item.
    pub fn check_wait(&self, id: ItemId, username: &str) -> Result<bool, InventoryError> {
        let items = self.items.lock();
        let item = find(&items, id).ok_or(InventoryError::NotFound(id))?;
        if item.is_held_by(username) {
            return Err(InventoryError::SelfDeadlock);
        }
        Ok(item.is_available())
    }

    /// Suspends until item `id` is free.
    ///
    /// Does not borrow the item: by the time the caller acts on the result
    /// another user may already have taken it. There is no timeout and no
    /// ordering among waiters. Dropping the returned future cancels the wait
    /// without touching any item.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - No item has this id.
    /// - [`InventoryError::SelfDeadlock`] - `username` holds the item; returned without waiting.
    pub async fn wait_until_available(
        &self,
        id: ItemId,
        username: &str,
    ) -> Result<(), InventoryError> {
        // Subscribe before the first check so a return that lands between
        // the check and the suspension still wakes us.
        let mut changes = self.availability.subscribe();
        if self.check_wait(id, username)? {
            return Ok(());
        }

        debug!(item = %id, user = username, "waiting for item");
        loop {
            // The sender lives in `self`, so the channel cannot close while we wait.
            if changes.changed().await.is_err() {
                return Err(InventoryError::NotFound(id));
            }

            let available = {
                let items = self.items.lock();
                find(&items, id).is_some_and(ItemRecord::is_available)
            };
            if available {
                return Ok(());
            }
        }
    }
}

impl Default for InventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find(items: &[ItemRecord], id: ItemId) -> Option<&ItemRecord> {
    items.iter().find(|item| item.id() == id)
}

fn find_mut(items: &mut [ItemRecord], id: ItemId) -> Result<&mut ItemRecord, InventoryError> {
    items
        .iter_mut()
        .find(|item| item.id() == id)
        .ok_or(InventoryError::NotFound(id))
}
