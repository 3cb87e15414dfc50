//! Demo binary: drives a handful of participants through the scenarios the
//! live session subsystem is built for, all in a single process over the
//! in-memory transport and store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use liftsync::live_session::{
    InProcessTransport, PresenceTracker, ReactionType, SessionManager, SqliteStore, SyncMode,
};
use liftsync::storage::{Database, SessionSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LiftSync demo v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(SqliteStore::new(Database::open_in_memory()?));
    let transport: Arc<dyn liftsync::live_session::Transport> = Arc::new(InProcessTransport::new());
    let presence = Arc::new(PresenceTracker::new());
    let settings = SessionSettings::default();

    let host = SessionManager::new(
        Uuid::new_v4(),
        "host",
        Arc::clone(&store),
        Arc::clone(&transport),
        Arc::clone(&presence),
        settings.clone(),
    );
    let alice = SessionManager::new(
        Uuid::new_v4(),
        "alice",
        Arc::clone(&store),
        Arc::clone(&transport),
        Arc::clone(&presence),
        settings.clone(),
    );
    let bob = SessionManager::new(
        Uuid::new_v4(),
        "bob",
        Arc::clone(&store),
        Arc::clone(&transport),
        Arc::clone(&presence),
        settings.clone(),
    );

    // Scenario: create, invite, accept.
    let session_id = host
        .create_session(&[alice.local_user_id(), bob.local_user_id()], None, Some(SyncMode::Strict))
        .await?;
    tracing::info!(%session_id, "host created session");

    join_all(vec![
        alice.accept_invite(session_id, alice.local_user_id(), "alice"),
        bob.accept_invite(session_id, bob.local_user_id(), "bob"),
    ])
    .await
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;
    tracing::info!("alice and bob joined");

    // Scenario: reactions fan out over the reliable channel.
    alice.send_reaction(ReactionType::Fire, None)?;

    // Scenario: strict-sync barrier resolves once both report their set.
    host.report_set_completed(0, 0, 90)?;
    alice.report_set_completed(0, 0, 90)?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Scenario: leadership transfer, then the old leader leaves.
    host.transfer_leadership(alice.local_user_id()).await?;
    host.leave_session().await?;
    tracing::info!("host transferred leadership to alice and left");

    // Scenario: the new leader kicks a disruptive participant.
    alice.kick_participant(bob.local_user_id()).await?;
    tracing::info!("alice kicked bob");

    // Scenario: finish with a holdout, then force-end.
    let (outcome, _summary) = liftsync::live_session::finish(&alice, vec![]).await?;
    tracing::info!(?outcome, "alice finished her workout");

    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
