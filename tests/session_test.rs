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

//! Protocol state machine tests.
//!
//! Sessions are driven directly, or through `session::run` over in-memory
//! duplex streams, with several sessions sharing one store.

use equipment_lending::session::{self, Session, SessionState};
use equipment_lending::{ActivityLog, InventoryStore, ItemId, Response};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT_LIMIT: Duration = Duration::from_secs(2);

// === Helper Functions ===

fn session_on(store: &Arc<InventoryStore>) -> Session {
    Session::new(Arc::clone(store), ActivityLog::disabled(), None)
}

async fn say(session: &mut Session, line: &str) -> String {
    session
        .handle_line(line)
        .await
        .expect("command should not drop the connection")
        .to_string()
}

async fn logged_in(store: &Arc<InventoryStore>, user: &str) -> Session {
    let mut session = session_on(store);
    assert_eq!(say(&mut session, &format!("HELLO {user}")).await, "OK HELLO");
    session
}

/// Client end of a session served by `session::run` on a background task.
struct Connection {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    task: JoinHandle<Session>,
}

impl Connection {
    fn open(store: &Arc<InventoryStore>) -> Self {
        let (client, server) = tokio::io::duplex(4096);
        let mut session = session_on(store);
        let task = tokio::spawn(async move {
            let (reader, mut writer) = tokio::io::split(server);
            let mut reader = BufReader::new(reader);
            let _ = session::run(&mut session, &mut reader, &mut writer).await;
            session
        });
        let (reader, writer) = tokio::io::split(client);
        Self {
            reader: BufReader::new(reader),
            writer,
            task,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        let mut buf = String::new();
        timeout(WAIT_LIMIT, equipment_lending::transport::read_line(&mut self.reader, &mut buf))
            .await
            .expect("timed out waiting for a response")
            .unwrap()
            .map(str::to_string)
    }

    async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv().await.expect("connection closed")
    }
}

/// `Write` sink shared with the test.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// === Scenarios ===

#[tokio::test]
async fn scenario_a_double_borrow_is_unavailable() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;

    assert_eq!(say(&mut alice, "BORROW 1").await, "OK BORROWED1");
    assert_eq!(say(&mut alice, "BORROW 1").await, "ERR UNAVAILABLE borrowed_by=alice");
}

#[tokio::test]
async fn scenario_b_unknown_item_is_not_found() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;

    assert_eq!(say(&mut alice, "BORROW 99").await, "ERR NOT_FOUND item");
    assert_eq!(say(&mut alice, "RETURN 99").await, "ERR NOT_FOUND item");
    assert_eq!(say(&mut alice, "WAIT 99").await, "ERR NOT_FOUND item");
}

#[tokio::test]
async fn scenario_c_only_the_borrower_may_return() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;
    let mut bob = logged_in(&store, "bob").await;

    assert_eq!(say(&mut alice, "BORROW 1").await, "OK BORROWED1");
    assert_eq!(say(&mut bob, "RETURN 1").await, "ERR PERMISSION not_owner");
    assert_eq!(say(&mut bob, "RETURN 2").await, "ERR PERMISSION not_owner");
    assert_eq!(say(&mut alice, "RETURN 1").await, "OK RETURNED1");
}

#[tokio::test]
async fn scenario_d_waiting_on_own_item_is_a_deadlock() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;

    assert_eq!(say(&mut alice, "BORROW 1").await, "OK BORROWED1");
    let reply = timeout(WAIT_LIMIT, say(&mut alice, "WAIT 1"))
        .await
        .expect("self-deadlock must not block");
    assert_eq!(reply, "ERR DEADLOCK item");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_e_wait_resolves_when_item_is_returned() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = Connection::open(&store);
    let mut bob = Connection::open(&store);

    assert_eq!(alice.request("HELLO alice").await, "OK HELLO");
    assert_eq!(alice.request("BORROW 1").await, "OK BORROWED1");
    assert_eq!(bob.request("HELLO bob").await, "OK HELLO");

    bob.send("WAIT 1").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(alice.request("RETURN 1").await, "OK RETURNED1");
    assert_eq!(bob.recv().await.as_deref(), Some("OK AVAILABLE 1"));
    assert_eq!(bob.request("BORROW 1").await, "OK BORROWED1");
}

// === State Machine ===

#[tokio::test]
async fn commands_require_hello() {
    let store = Arc::new(InventoryStore::new());
    let mut session = session_on(&store);

    for line in ["LIST", "BORROW 1", "RETURN 1", "WAIT 1", "BORROW x", "JUMP"] {
        assert_eq!(say(&mut session, line).await, "ERR STATE not_authenticated", "{line}");
    }
    assert_eq!(store.item(ItemId(1)).unwrap().borrower, None);
}

#[tokio::test]
async fn protocol_errors_after_hello() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;

    assert_eq!(say(&mut alice, "").await, "ERR PROTOCOL command_invalid");
    assert_eq!(say(&mut alice, "JUMP").await, "ERR PROTOCOL invalid_command");
    assert_eq!(say(&mut alice, "BORROW").await, "ERR PROTOCOL invalid_id");
    assert_eq!(say(&mut alice, "BORROW one").await, "ERR PROTOCOL invalid_id");
    assert_eq!(say(&mut alice, "RETURN 1x").await, "ERR PROTOCOL invalid_id");
    assert_eq!(say(&mut alice, "WAIT").await, "ERR PROTOCOL invalid_id");
    assert_eq!(say(&mut alice, "HELLO").await, "ERR PROTOCOL missing_username");
}

#[tokio::test]
async fn list_reports_every_item() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;
    say(&mut alice, "BORROW 3").await;

    let listing = say(&mut alice, "LIST").await;
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 16);
    assert_eq!(lines[0], "OK LIST 15");
    assert_eq!(lines[1], "1 Camera FREE");
    assert_eq!(lines[3], "3 Laptop BORROWED by=alice");
}

#[tokio::test]
async fn quit_closes_session() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;

    assert_eq!(say(&mut alice, "QUIT").await, "OK BYE");
    assert_eq!(alice.state(), &SessionState::Closed);
}

#[tokio::test]
async fn dispatch_maps_responses() {
    let store = Arc::new(InventoryStore::new());
    let mut alice = logged_in(&store, "alice").await;

    let response = alice
        .dispatch(equipment_lending::Command::Borrow { id: ItemId(4) })
        .await
        .unwrap();
    assert_eq!(response, Response::Borrowed(ItemId(4)));
    assert!(response.is_ok());
}

// === Connection Loop ===

#[tokio::test]
async fn run_ends_after_quit() {
    let store = Arc::new(InventoryStore::new());
    let mut conn = Connection::open(&store);

    assert_eq!(conn.request("QUIT").await, "OK BYE");
    assert_eq!(conn.recv().await, None);

    let session = timeout(WAIT_LIMIT, conn.task).await.unwrap().unwrap();
    assert!(session.is_closed());
}

#[tokio::test]
async fn run_sends_full_list() {
    let store = Arc::new(InventoryStore::new());
    let mut conn = Connection::open(&store);

    assert_eq!(conn.request("HELLO alice").await, "OK HELLO");
    assert_eq!(conn.request("LIST").await, "OK LIST 15");
    for expected in 1..=15 {
        let line = conn.recv().await.unwrap();
        assert!(line.starts_with(&format!("{expected} ")), "{line}");
    }
}

#[tokio::test]
async fn pipelined_commands_are_answered_in_order() {
    let store = Arc::new(InventoryStore::new());
    let mut conn = Connection::open(&store);

    conn.writer
        .write_all(b"HELLO alice\nBORROW 2\nRETURN 2\nQUIT\n")
        .await
        .unwrap();

    assert_eq!(conn.recv().await.as_deref(), Some("OK HELLO"));
    assert_eq!(conn.recv().await.as_deref(), Some("OK BORROWED2"));
    assert_eq!(conn.recv().await.as_deref(), Some("OK RETURNED2"));
    assert_eq!(conn.recv().await.as_deref(), Some("OK BYE"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hang_up_cancels_pending_wait() {
    let store = Arc::new(InventoryStore::new());
    store.borrow_item(ItemId(6), "alice").unwrap();

    let mut bob = Connection::open(&store);
    assert_eq!(bob.request("HELLO bob").await, "OK HELLO");
    bob.send("WAIT 6").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let Connection { reader, writer, task } = bob;
    drop(writer);
    drop(reader);

    let session = timeout(WAIT_LIMIT, task)
        .await
        .expect("session should end when the peer hangs up")
        .unwrap();
    assert_eq!(session.username(), Some("bob"));

    // The store is untouched and still usable.
    assert_eq!(store.item(ItemId(6)).unwrap().borrower.as_deref(), Some("alice"));
    store.return_item(ItemId(6), "alice").unwrap();
}

#[tokio::test]
async fn invalid_utf8_is_answered_and_session_continues() {
    let store = Arc::new(InventoryStore::new());
    let mut conn = Connection::open(&store);

    conn.writer
        .write_all(b"HELLO alice\nBORROW \xff\nJUMP\xfe\nLIST\n")
        .await
        .unwrap();

    assert_eq!(conn.recv().await.as_deref(), Some("OK HELLO"));
    assert_eq!(conn.recv().await.as_deref(), Some("ERR PROTOCOL invalid_id"));
    assert_eq!(conn.recv().await.as_deref(), Some("ERR PROTOCOL invalid_command"));
    assert_eq!(conn.recv().await.as_deref(), Some("OK LIST 15"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn half_closed_peer_still_gets_wait_response() {
    let store = Arc::new(InventoryStore::new());
    store.borrow_item(ItemId(1), "alice").unwrap();

    let mut bob = Connection::open(&store);
    bob.writer.write_all(b"HELLO bob\nWAIT 1\n").await.unwrap();
    bob.writer.shutdown().await.unwrap();
    assert_eq!(bob.recv().await.as_deref(), Some("OK HELLO"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    store.return_item(ItemId(1), "alice").unwrap();

    assert_eq!(bob.recv().await.as_deref(), Some("OK AVAILABLE 1"));
    assert_eq!(bob.recv().await, None);
    let session = timeout(WAIT_LIMIT, bob.task).await.unwrap().unwrap();
    assert_eq!(session.username(), Some("bob"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hang_up_with_queued_input_cancels_pending_wait() {
    let store = Arc::new(InventoryStore::new());
    store.borrow_item(ItemId(1), "alice").unwrap();

    let mut bob = Connection::open(&store);
    bob.writer.write_all(b"HELLO bob\nWAIT 1\nLIST\n").await.unwrap();
    assert_eq!(bob.recv().await.as_deref(), Some("OK HELLO"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let Connection { reader, writer, task } = bob;
    drop(writer);
    drop(reader);

    timeout(WAIT_LIMIT, task)
        .await
        .expect("session should end when the peer hangs up")
        .unwrap();
    assert_eq!(store.item(ItemId(1)).unwrap().borrower.as_deref(), Some("alice"));
}

#[tokio::test]
async fn rejected_waits_are_not_logged_as_started() {
    let buffer = SharedBuffer::default();
    let (activity, writer) = ActivityLog::spawn(buffer.clone()).unwrap();
    let store = Arc::new(InventoryStore::new());
    let mut alice = Session::new(Arc::clone(&store), activity, None);

    assert_eq!(say(&mut alice, "HELLO alice").await, "OK HELLO");
    assert_eq!(say(&mut alice, "WAIT 99").await, "ERR NOT_FOUND item");
    assert_eq!(say(&mut alice, "BORROW 2").await, "OK BORROWED2");
    assert_eq!(say(&mut alice, "WAIT 2").await, "ERR DEADLOCK item");
    assert_eq!(say(&mut alice, "WAIT 3").await, "OK AVAILABLE 3");
    drop(alice);
    tokio::task::spawn_blocking(move || writer.join()).await.unwrap();

    let log = String::from_utf8(buffer.0.lock().clone()).unwrap();
    let events: Vec<&str> = log
        .lines()
        .map(|row| row.split(',').nth(3).unwrap_or_default())
        .collect();
    assert_eq!(events, vec!["hello", "borrowed", "wait_started", "wait_resolved"]);
    assert!(log.contains(",alice,wait_started,3"));
}
