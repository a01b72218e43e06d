//! Sync Simulation
//!
//! Drives two clients against the in-process loopback server and prints how
//! each client's view converges:
//!
//!   jane ──┐                      ┌── board-created / note-added / ...
//!          ├─→ LoopbackServer ──→ room team:<id>
//!   sam  ──┘                      └── team-users-count
//!
//! The run exercises self-echo suppression, optimistic deletes, a failed
//! request without rollback, and a team switch with events still in flight.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sync-sim
//! RUST_LOG=teamboard_core=debug cargo run --bin sync-sim
//! ```
//!
//! `TEAMBOARD_REQUEST_TIMEOUT_MS` bounds every request, as it does for a real
//! client.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teamboard_core::loopback::{LoopbackConnection, LoopbackServer, Operation};
use teamboard_core::{ApiError, SessionUser, SyncClient, SyncConfig, SyncEvent, ViewSnapshot};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

type LoopbackClient = SyncClient<LoopbackConnection, LoopbackConnection>;

fn connect(server: &LoopbackServer, config: &SyncConfig, user: SessionUser) -> LoopbackClient {
    let connection = Arc::new(server.connect(user));
    SyncClient::new(config.clone(), connection.clone(), connection)
}

/// Let listener tasks drain the room before printing
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn print_view(label: &str, snapshot: &ViewSnapshot) {
    let team = snapshot
        .team
        .as_ref()
        .map(|t| t.name.as_str())
        .unwrap_or("<none>");
    println!("   [{label}] team={team} online={} rev={}", snapshot.online, snapshot.revision);
    for board in &snapshot.boards {
        let notes: Vec<&str> = board.notes.iter().map(|n| n.content.as_str()).collect();
        println!("   [{label}]   {} {:?}", board.title, notes);
    }
}

fn drain_notifications(label: &str, rx: &mut broadcast::Receiver<SyncEvent>) {
    while let Ok(event) = rx.try_recv() {
        if let SyncEvent::Notification(n) = event {
            println!("   [{label}] 🔔 {:?}: {}", n.level, n.message);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SyncConfig::from_env();
    println!("🔧 Starting sync simulation (timeout {}ms)", config.request_timeout_ms);

    let server = LoopbackServer::new(config.event_buffer);
    let marketing = server.seed_team("Marketing", &["u-jane", "u-sam"]);
    let design = server.seed_team("Design", &["u-jane"]);
    server.seed_board(&marketing.id, "Backlog", &["Draft launch email"]);

    let jane = connect(&server, &config, SessionUser::new("u-jane", "jane.doe@example.com", ""));
    let sam = connect(&server, &config, SessionUser::new("u-sam", "sam@example.com", "Sam"));
    let mut jane_events = jane.subscribe();
    let mut sam_events = sam.subscribe();

    jane.sign_in(SessionUser::new("u-jane", "jane.doe@example.com", ""))
        .await;
    sam.sign_in(SessionUser::new("u-sam", "sam@example.com", "Sam"))
        .await;

    println!("\n📡 Both clients activate {}", marketing.name);
    jane.activate_team(marketing.clone()).await?;
    sam.activate_team(marketing.clone()).await?;
    settle().await;
    print_view("jane", &jane.snapshot().await);
    print_view("sam", &sam.snapshot().await);

    println!("\n🧱 Jane creates a board; Sam adds a note to it");
    let board = jane.create_board("Q1 Campaign").await?;
    settle().await;
    sam.add_note(&board.id, "Book the venue").await?;
    settle().await;
    drain_notifications("jane", &mut jane_events);
    drain_notifications("sam", &mut sam_events);
    print_view("jane", &jane.snapshot().await);
    print_view("sam", &sam.snapshot().await);

    println!("\n💥 Server rejects Sam's next delete; the local removal stays");
    server.fail_next(
        Operation::DeleteNote,
        ApiError::rejected(500, "Internal Server Error"),
    );
    let note_id = sam
        .snapshot()
        .await
        .board(&board.id)
        .and_then(|b| b.notes.first())
        .map(|n| n.id.clone())
        .context("note should have reached Sam")?;
    if let Err(e) = sam.delete_note(&board.id, &note_id).await {
        println!("   [sam] delete failed: {e}");
    }
    settle().await;
    drain_notifications("sam", &mut sam_events);
    print_view("jane", &jane.snapshot().await);
    print_view("sam", &sam.snapshot().await);

    println!("\n🔀 Sam deletes the board while Jane switches to {}", design.name);
    server.hold_events();
    sam.delete_board(&board.id).await?;
    let in_flight = server.take_held_events();
    jane.switch_team(design.clone()).await?;
    server.release_events(in_flight);
    settle().await;
    drain_notifications("jane", &mut jane_events);
    print_view("jane", &jane.snapshot().await);
    print_view("sam", &sam.snapshot().await);

    jane.sign_out().await;
    sam.sign_out().await;
    println!("\n✅ Simulation complete");
    Ok(())
}
