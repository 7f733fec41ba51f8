use super::*;
use shared::{domain::Chocolate, lobby};

fn catalog() -> Vec<Chocolate> {
    vec![Chocolate::new("1", "Bitter"), Chocolate::new("2", "Sütlü")]
}

fn new_lobby(id: &str, host: &str) -> Lobby {
    lobby::create_with_id(LobbyId::from(id), host, &catalog()).expect("lobby")
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn writes_and_reads_lobby_document() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lobby = new_lobby("ABC123", "alice");
    storage.write_lobby(&lobby, None).await.expect("create");

    let loaded = storage
        .read_lobby(&lobby.id)
        .await
        .expect("read")
        .expect("present");
    assert_eq!(loaded, lobby);

    let missing = storage
        .read_lobby(&LobbyId::from("NOPE00"))
        .await
        .expect("read");
    assert!(missing.is_none());
}

#[tokio::test]
async fn creating_an_existing_lobby_conflicts() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lobby = new_lobby("ABC123", "alice");
    storage.write_lobby(&lobby, None).await.expect("create");

    let again = new_lobby("ABC123", "mallory");
    let err = storage
        .write_lobby(&again, None)
        .await
        .expect_err("id taken");
    assert!(matches!(err, StoreError::Conflict { expected: None, .. }));

    let stored = storage
        .read_lobby(&lobby.id)
        .await
        .expect("read")
        .expect("present");
    assert_eq!(stored.host, "alice");
}

#[tokio::test]
async fn stale_base_version_is_rejected() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let base = new_lobby("RACE01", "alice");
    storage.write_lobby(&base, None).await.expect("create");

    let with_bob = lobby::join(Some(&base), "bob").expect("bob");
    let with_carol = lobby::join(Some(&base), "carol").expect("carol");

    storage
        .write_lobby(&with_bob, Some(base.version))
        .await
        .expect("first writer wins");
    let err = storage
        .write_lobby(&with_carol, Some(base.version))
        .await
        .expect_err("second writer is stale");
    assert!(matches!(err, StoreError::Conflict { expected: Some(1), .. }));

    let stored = storage
        .read_lobby(&base.id)
        .await
        .expect("read")
        .expect("present");
    assert_eq!(stored.participants, vec!["alice".to_string(), "bob".to_string()]);
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn updating_a_missing_lobby_reports_missing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lobby = new_lobby("GHOST1", "alice");
    let err = storage
        .write_lobby(&lobby, Some(1))
        .await
        .expect_err("nothing to update");
    assert!(matches!(err, StoreError::Missing(_)));
}

#[tokio::test]
async fn subscription_yields_initial_snapshot_then_updates() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lobby = new_lobby("SUB001", "alice");
    let other = new_lobby("OTHER1", "zed");

    let mut subscription = storage.subscribe(&lobby.id).await.expect("subscribe");
    assert_eq!(subscription.recv().await.expect("initial"), None);

    storage.write_lobby(&other, None).await.expect("other lobby");
    storage.write_lobby(&lobby, None).await.expect("create");
    let joined = lobby::join(Some(&lobby), "bob").expect("join");
    storage
        .write_lobby(&joined, Some(lobby.version))
        .await
        .expect("join write");

    assert_eq!(subscription.recv().await.expect("created"), Some(lobby));
    assert_eq!(subscription.recv().await.expect("joined"), Some(joined));
}

#[tokio::test]
async fn subscription_skips_versions_already_in_initial_snapshot() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lobby = new_lobby("SUB002", "alice");
    storage.write_lobby(&lobby, None).await.expect("create");

    let mut subscription = storage.subscribe(&lobby.id).await.expect("subscribe");
    let initial = subscription.recv().await.expect("initial").expect("present");
    assert_eq!(initial.version, 1);

    let started = lobby::start_voting(&initial, "alice").expect("start");
    storage
        .write_lobby(&started, Some(initial.version))
        .await
        .expect("write");
    let next = subscription.recv().await.expect("update").expect("present");
    assert_eq!(next.version, 2);
    assert!(next.is_voting_started);
}

#[tokio::test]
async fn lagging_subscription_fails_terminally() {
    let storage = Storage::with_event_capacity("sqlite::memory:", 1)
        .await
        .expect("db");
    let mut lobby = new_lobby("LAG001", "alice");
    storage.write_lobby(&lobby, None).await.expect("create");

    let mut subscription = storage.subscribe(&lobby.id).await.expect("subscribe");
    subscription.recv().await.expect("initial");

    for name in ["bob", "carol", "dave"] {
        let next = lobby::join(Some(&lobby), name).expect("join");
        storage
            .write_lobby(&next, Some(lobby.version))
            .await
            .expect("write");
        lobby = next;
    }

    let err = subscription.recv().await.expect_err("lagged");
    assert!(matches!(err, StoreError::Lagged(_)));
}

#[tokio::test]
async fn writes_to_other_lobbies_do_not_lag_a_subscriber() {
    let storage = Storage::with_event_capacity("sqlite::memory:", 1)
        .await
        .expect("db");
    let watched = new_lobby("QUIET1", "alice");
    storage.write_lobby(&watched, None).await.expect("create");

    let mut subscription = storage.subscribe(&watched.id).await.expect("subscribe");
    subscription.recv().await.expect("initial");

    let mut busy = new_lobby("BUSY01", "zed");
    storage.write_lobby(&busy, None).await.expect("busy create");
    let mut watcher_of_busy = storage.subscribe(&busy.id).await.expect("busy subscribe");
    watcher_of_busy.recv().await.expect("busy initial");
    for name in ["bob", "carol", "dave"] {
        let next = lobby::join(Some(&busy), name).expect("join");
        storage
            .write_lobby(&next, Some(busy.version))
            .await
            .expect("busy write");
        busy = next;
    }
    for n in 0..3 {
        let id = format!("NOISE{n}");
        storage
            .write_lobby(&new_lobby(&id, "zed"), None)
            .await
            .expect("noise create");
    }

    let joined = lobby::join(Some(&watched), "bob").expect("join");
    storage
        .write_lobby(&joined, Some(watched.version))
        .await
        .expect("watched write");
    assert_eq!(subscription.recv().await.expect("own update"), Some(joined));

    let err = watcher_of_busy.recv().await.expect_err("busy watcher lagged");
    assert!(matches!(err, StoreError::Lagged(_)));
}

#[tokio::test]
async fn dropped_subscriptions_release_their_channel() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lobby = new_lobby("GONE01", "alice");
    storage.write_lobby(&lobby, None).await.expect("create");

    let subscription = storage.subscribe(&lobby.id).await.expect("subscribe");
    assert_eq!(storage.channels.lock().await.len(), 1);
    drop(subscription);

    let joined = lobby::join(Some(&lobby), "bob").expect("join");
    storage
        .write_lobby(&joined, Some(lobby.version))
        .await
        .expect("write");
    assert!(storage.channels.lock().await.is_empty());
}

#[tokio::test]
async fn lists_lobby_summaries() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lobby = new_lobby("LIST01", "alice");
    storage.write_lobby(&lobby, None).await.expect("create");
    let joined = lobby::join(Some(&lobby), "bob").expect("join");
    storage
        .write_lobby(&joined, Some(1))
        .await
        .expect("write");

    let summaries = storage.list_lobbies().await.expect("list");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].lobby_id, lobby.id);
    assert_eq!(summaries[0].host, "alice");
    assert_eq!(summaries[0].participant_count, 2);
    assert_eq!(summaries[0].version, 2);
    assert!(!summaries[0].is_voting_started);
}
