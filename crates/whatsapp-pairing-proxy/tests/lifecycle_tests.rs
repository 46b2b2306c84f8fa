//! Session lifecycle tests against a fake pairing client.

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use whatsapp_client::{ConnectionEvent, DisconnectReason};
use whatsapp_pairing_proxy::{PairingOutcome, ServiceError, SessionManager, SessionState};

#[tokio::test]
async fn test_repeat_request_reuses_session() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    let first = manager.request_pairing(&phone()).await.unwrap();
    let second = manager.request_pairing(&phone()).await.unwrap();

    assert_eq!(first, PairingOutcome::New("K7QX-9M2P".into()));
    assert_eq!(second, PairingOutcome::Existing("K7QX-9M2P".into()));
    assert_eq!(factory.creates(), 1);
    assert_eq!(manager.status(&phone()).await, Some(SessionState::Pending));
}

#[tokio::test]
async fn test_concurrent_requests_create_one_client() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.request_pairing(&phone()).await })
        })
        .collect();

    let mut new_sessions = 0;
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.code(), "K7QX-9M2P");
        if matches!(outcome, PairingOutcome::New(_)) {
            new_sessions += 1;
        }
    }

    assert_eq!(new_sessions, 1);
    assert_eq!(factory.creates(), 1);
    assert_eq!(manager.count().await, 1);
}

#[tokio::test]
async fn test_distinct_numbers_get_distinct_sessions() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    let other = whatsapp_pairing_proxy::PhoneNumber::parse("447700900123").unwrap();
    manager.request_pairing(&phone()).await.unwrap();
    manager.request_pairing(&other).await.unwrap();

    assert_eq!(factory.creates(), 2);
    assert_eq!(manager.count().await, 2);
}

#[tokio::test]
async fn test_open_delivers_session_data_and_removes_session() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();
    factory.open().await;

    assert!(eventually(|| async { manager.status(&phone()).await.is_none() }).await);

    let sent = factory.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, USER_ID);
    assert!(sent[0].1.starts_with("✅ *Connected Successfully!*"));
    assert!(sent[0].1.contains("15551234567:4@s.whatsapp.net"));
    assert!(eventually(|| async { factory.closes() == 1 }).await);
}

#[tokio::test]
async fn test_open_removes_session_even_if_delivery_fails() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    factory.state.fail_send.store(true, Ordering::SeqCst);
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();
    factory.open().await;

    assert!(eventually(|| async { manager.status(&phone()).await.is_none() }).await);
    assert!(factory.sent().is_empty());
}

#[tokio::test]
async fn test_open_reported_during_creation_is_handled() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    factory.emit_on_create(ConnectionEvent::Open {
        user_id: USER_ID.into(),
    });
    let manager = manager(&factory, root.path());

    let outcome = manager.request_pairing(&phone()).await.unwrap();
    assert!(matches!(outcome, PairingOutcome::New(_)));

    assert!(eventually(|| async { manager.status(&phone()).await.is_none() }).await);
    let sent = factory.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, USER_ID);
    assert_eq!(factory.creates(), 1);
}

#[tokio::test]
async fn test_open_without_user_id_skips_confirmation() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();
    factory
        .emit(ConnectionEvent::Open {
            user_id: String::new(),
        })
        .await;

    assert!(eventually(|| async { manager.status(&phone()).await.is_none() }).await);
    assert!(factory.sent().is_empty());
    assert!(eventually(|| async { factory.closes() == 1 }).await);
}

#[tokio::test]
async fn test_new_session_after_completed_pairing() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();
    factory.open().await;
    assert!(eventually(|| async { manager.status(&phone()).await.is_none() }).await);

    let outcome = manager.request_pairing(&phone()).await.unwrap();
    assert!(matches!(outcome, PairingOutcome::New(_)));
    assert_eq!(factory.creates(), 2);
}

#[tokio::test]
async fn test_logged_out_session_stays_in_store() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();
    factory.close_with(401).await;

    assert!(
        eventually(|| async { manager.status(&phone()).await == Some(SessionState::LoggedOut) })
            .await
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.status(&phone()).await, Some(SessionState::LoggedOut));
    assert_eq!(factory.creates(), 1);
    assert_eq!(factory.closes(), 1);

    // Still answered with the original code
    let outcome = manager.request_pairing(&phone()).await.unwrap();
    assert_eq!(outcome, PairingOutcome::Existing("K7QX-9M2P".into()));
}

#[tokio::test]
async fn test_transient_close_reconnects_with_fresh_client() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();
    factory.close_with(515).await;

    assert!(eventually(|| async { manager.reconnects(&phone()).await == Some(1) }).await);
    assert_eq!(factory.creates(), 2);
    assert_eq!(factory.closes(), 1);
    assert_eq!(manager.status(&phone()).await, Some(SessionState::Pending));
    assert_eq!(
        manager.pairing_code(&phone()).await.as_deref(),
        Some("K7QX-9M2P")
    );

    // The replacement client carries the full set of reactions.
    factory.open().await;
    assert!(eventually(|| async { manager.status(&phone()).await.is_none() }).await);
    assert_eq!(factory.sent().len(), 1);
    assert!(eventually(|| async { factory.closes() == 2 }).await);
}

#[tokio::test]
async fn test_reconnect_waits_for_backoff() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = Arc::new(
        SessionManager::new(Arc::new(factory.clone()), root.path())
            .with_reconnect_policy(Duration::from_millis(300), TEST_MAX_RECONNECTS),
    );

    manager.request_pairing(&phone()).await.unwrap();
    factory.close_with(408).await;

    assert!(
        eventually(|| async {
            manager.status(&phone()).await == Some(SessionState::Reconnecting)
        })
        .await
    );
    assert_eq!(factory.creates(), 1);
    assert_eq!(factory.closes(), 1);

    assert!(eventually(|| async { manager.reconnects(&phone()).await == Some(1) }).await);
    assert_eq!(factory.creates(), 2);
}

#[tokio::test]
async fn test_reconnect_limit_marks_session_failed() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    factory.emit_on_create(ConnectionEvent::Closed {
        reason: DisconnectReason::TimedOut,
    });
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();

    assert!(
        eventually(|| async { manager.status(&phone()).await == Some(SessionState::Failed) })
            .await
    );

    // No further clients once the limit is hit
    tokio::time::sleep(Duration::from_millis(100)).await;
    let expected = 1 + TEST_MAX_RECONNECTS as usize;
    assert_eq!(factory.creates(), expected);
    assert_eq!(factory.closes(), expected);
    assert_eq!(
        manager.reconnects(&phone()).await,
        Some(TEST_MAX_RECONNECTS)
    );
}

#[tokio::test]
async fn test_failed_reconnection_marks_session_failed() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();
    factory.state.fail_create.store(true, Ordering::SeqCst);
    factory.close_with(408).await;

    assert!(
        eventually(|| async { manager.status(&phone()).await == Some(SessionState::Failed) })
            .await
    );
    assert_eq!(factory.creates(), 2);
}

#[tokio::test]
async fn test_pairing_failure_leaves_no_session() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    factory.state.fail_pairing.store(true, Ordering::SeqCst);
    let manager = manager(&factory, root.path());

    let result = manager.request_pairing(&phone()).await;
    assert!(matches!(result, Err(ServiceError::PairingFailed(_))));
    assert_eq!(manager.status(&phone()).await, None);
    assert_eq!(factory.closes(), 1);

    // No retry at this layer; the next request starts over.
    factory.state.fail_pairing.store(false, Ordering::SeqCst);
    let outcome = manager.request_pairing(&phone()).await.unwrap();
    assert!(matches!(outcome, PairingOutcome::New(_)));
    assert_eq!(factory.creates(), 2);
}

#[tokio::test]
async fn test_client_creation_failure() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    factory.state.fail_create.store(true, Ordering::SeqCst);
    let manager = manager(&factory, root.path());

    let result = manager.request_pairing(&phone()).await;
    assert!(matches!(result, Err(ServiceError::PairingFailed(_))));
    assert_eq!(manager.count().await, 0);
}

#[tokio::test]
async fn test_credentials_written_under_phone_directory() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    manager.request_pairing(&phone()).await.unwrap();

    assert!(root.path().join(PHONE).join("creds.json").exists());
}

#[tokio::test]
async fn test_shutdown_closes_every_client() {
    let root = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new();
    let manager = manager(&factory, root.path());

    let other = whatsapp_pairing_proxy::PhoneNumber::parse("447700900123").unwrap();
    manager.request_pairing(&phone()).await.unwrap();
    manager.request_pairing(&other).await.unwrap();

    manager.shutdown().await;

    assert_eq!(manager.count().await, 0);
    assert_eq!(factory.closes(), 2);
}
