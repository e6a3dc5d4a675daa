// tests/bulk_action_tests.rs
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;

use ticketbot_common::models::{Ticket, TicketStatus, AUTO_CLOSE_ACTOR};
use ticketbot_common::traits::TicketRepository;
use ticketbot_core::repositories::memory::InMemoryStore;
use ticketbot_core::services::bulk_actions::{BulkReport, BULK_CLOSE_REASON};
use ticketbot_core::services::EngineConfig;
use ticketbot_core::test_utils::helpers::*;
use ticketbot_core::Error;

fn channel_of(ticket: &Ticket) -> String {
    ticket.channel_id.clone().expect("open ticket has a channel")
}

fn tight_config(side_effect_timeout: Duration) -> EngineConfig {
    EngineConfig { side_effect_timeout, ..EngineConfig::immediate() }
}

/// Harness whose engine writes through a `ScriptedTicketStore`.
fn scripted_harness(scripted: Arc<ScriptedTicketStore>, store: Arc<InMemoryStore>, config: EngineConfig) -> TestHarness {
    let tickets: Arc<dyn TicketRepository> = scripted;
    TestHarness::with_parts(store, tickets, Arc::new(FakeProvisioner::new()), config)
}

#[tokio::test]
async fn test_close_inactive_only_touches_stale_tickets() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let stale = h.open_ticket(TEST_GUILD, "42").await?;
    let fresh = h.open_ticket(TEST_GUILD, "43").await?;
    h.age_ticket(TEST_GUILD, &stale.ticket_id, 8).await?;
    h.age_ticket(TEST_GUILD, &fresh.ticket_id, 6).await?;

    let report = h.bulk.close_inactive(TEST_GUILD, 7, "9").await?;
    assert_eq!(report, BulkReport { attempted: 1, succeeded: 1, failed: 0 });

    let closed = h.engine.get_ticket(TEST_GUILD, &stale.ticket_id).await?;
    assert_eq!(closed.status, TicketStatus::Closed);
    assert_eq!(closed.closed_by.as_deref(), Some("9"));
    assert_eq!(closed.close_reason.as_deref(), Some("inactivity (8 days)"));

    let notices = h.provisioner.notices_for(&channel_of(&stale)).await;
    assert!(notices.iter().any(|n| n.contains("8 days without activity")), "{notices:?}");
    assert!(h.provisioner.is_deleted(&channel_of(&stale)).await);

    let untouched = h.engine.get_ticket(TEST_GUILD, &fresh.ticket_id).await?;
    assert_eq!(untouched.status, TicketStatus::Open);
    Ok(())
}

#[tokio::test]
async fn test_threshold_is_inclusive() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let ticket = h.open_ticket(TEST_GUILD, "42").await?;
    h.age_ticket(TEST_GUILD, &ticket.ticket_id, 7).await?;

    let report = h.bulk.close_inactive(TEST_GUILD, 7, "9").await?;
    assert_eq!(report.succeeded, 1);
    Ok(())
}

#[tokio::test]
async fn test_activity_after_snapshot_wins() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let ticket = h.open_ticket(TEST_GUILD, "42").await?;
    h.age_ticket(TEST_GUILD, &ticket.ticket_id, 10).await?;

    // A message lands between the sweep's listing and the per-ticket re-check.
    h.engine.record_activity(TEST_GUILD, &channel_of(&ticket)).await?;
    let closed = h
        .engine
        .close_if_inactive(
            TEST_GUILD,
            &ticket.ticket_id,
            AUTO_CLOSE_ACTOR,
            7,
            Utc::now(),
            &h.engine.auto_close_mode(),
        )
        .await?;
    assert!(closed.is_none());
    assert!(h.engine.get_ticket(TEST_GUILD, &ticket.ticket_id).await?.is_open());
    Ok(())
}

#[tokio::test]
async fn test_missing_channel_still_closes_record() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let ticket = h.open_ticket(TEST_GUILD, "42").await?;
    let channel = channel_of(&ticket);
    h.age_ticket(TEST_GUILD, &ticket.ticket_id, 10).await?;

    // Deleted by hand on the platform.
    h.provisioner.remove_channel(&channel).await;

    let report = h.bulk.auto_close_inactive(TEST_GUILD, 7).await?;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let stored = h.engine.get_ticket(TEST_GUILD, &ticket.ticket_id).await?;
    assert_eq!(stored.status, TicketStatus::Closed);
    assert_eq!(stored.closed_by.as_deref(), Some(AUTO_CLOSE_ACTOR));

    // Only the welcome notice; no closure notice, no delete attempt.
    assert_eq!(h.provisioner.notices_for(&channel).await.len(), 1);
    assert!(!h.provisioner.is_deleted(&channel).await);
    Ok(())
}

#[tokio::test]
async fn test_close_all_open_skips_closed() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let a = h.open_ticket(TEST_GUILD, "42").await?;
    let b = h.open_ticket(TEST_GUILD, "43").await?;
    let c = h.open_ticket(TEST_GUILD, "44").await?;
    h.engine.close(TEST_GUILD, &channel_of(&c), "44", None).await?;

    let report = h.bulk.close_all_open(TEST_GUILD, "1").await?;
    assert_eq!(report, BulkReport { attempted: 2, succeeded: 2, failed: 0 });

    for t in [&a, &b] {
        let stored = h.engine.get_ticket(TEST_GUILD, &t.ticket_id).await?;
        assert_eq!(stored.status, TicketStatus::Closed);
        assert_eq!(stored.close_reason.as_deref(), Some(BULK_CLOSE_REASON));
        let notices = h.provisioner.notices_for(&channel_of(t)).await;
        assert!(notices.iter().any(|n| n.contains("bulk closure")));
    }
    Ok(())
}

#[tokio::test]
async fn test_delete_closed_purges_only_closed_records() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let a = h.open_ticket(TEST_GUILD, "42").await?;
    let b = h.open_ticket(TEST_GUILD, "43").await?;
    h.open_ticket(TEST_GUILD, "44").await?;
    h.engine.close(TEST_GUILD, &channel_of(&a), "42", None).await?;
    h.engine.close(TEST_GUILD, &channel_of(&b), "43", None).await?;

    let report = h.bulk.delete_closed(TEST_GUILD).await?;
    assert_eq!(report.succeeded, 2);
    assert_eq!(h.store.ticket_count(), 1);

    let missing = h.engine.get_ticket(TEST_GUILD, &a.ticket_id).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    // Purging an open ticket is refused.
    let open = h.engine.purge_closed_ticket(TEST_GUILD, "TKT-0003").await;
    assert!(matches!(open, Err(Error::NotClosed(_))));
    Ok(())
}

#[tokio::test]
async fn test_bulk_on_empty_guild_is_a_no_op() -> Result<(), Error> {
    let h = TestHarness::new();
    assert_eq!(h.bulk.close_all_open(TEST_GUILD, "1").await?, BulkReport::default());
    assert_eq!(h.bulk.delete_closed(TEST_GUILD).await?, BulkReport::default());
    assert_eq!(h.bulk.close_inactive(TEST_GUILD, 1, "1").await?, BulkReport::default());
    Ok(())
}

#[tokio::test]
async fn test_slow_commit_counts_as_success() -> Result<(), Error> {
    // The close write takes ten times longer than any single channel call.
    let store = Arc::new(InMemoryStore::new());
    let scripted = Arc::new(ScriptedTicketStore::with_close_delay(store.clone(), Duration::from_millis(200)));
    let h = scripted_harness(scripted, store, tight_config(Duration::from_millis(20)));
    h.configure_guild(TEST_GUILD).await?;
    let stale = h.open_ticket(TEST_GUILD, "42").await?;
    let other = h.open_ticket(TEST_GUILD, "43").await?;
    h.age_ticket(TEST_GUILD, &stale.ticket_id, 10).await?;

    let report = h.bulk.close_inactive(TEST_GUILD, 7, "9").await?;
    assert_eq!(report, BulkReport { attempted: 1, succeeded: 1, failed: 0 });

    let report = h.bulk.close_all_open(TEST_GUILD, "1").await?;
    assert_eq!(report, BulkReport { attempted: 1, succeeded: 1, failed: 0 });

    for t in [&stale, &other] {
        let stored = h.engine.get_ticket(TEST_GUILD, &t.ticket_id).await?;
        assert_eq!(stored.status, TicketStatus::Closed);
        assert!(h.provisioner.is_deleted(&channel_of(t)).await);
    }
    Ok(())
}

#[tokio::test]
async fn test_failing_ticket_does_not_stop_the_batch() -> Result<(), Error> {
    let store = Arc::new(InMemoryStore::new());
    let scripted = Arc::new(ScriptedTicketStore::new(store.clone()));
    let h = scripted_harness(scripted.clone(), store, EngineConfig::immediate());
    h.configure_guild(TEST_GUILD).await?;
    let a = h.open_ticket(TEST_GUILD, "42").await?;
    let b = h.open_ticket(TEST_GUILD, "43").await?;
    let c = h.open_ticket(TEST_GUILD, "44").await?;
    scripted.fail_close_of(&b.ticket_id).await;

    let report = h.bulk.close_all_open(TEST_GUILD, "1").await?;
    assert_eq!(report, BulkReport { attempted: 3, succeeded: 2, failed: 1 });

    for t in [&a, &c] {
        let stored = h.engine.get_ticket(TEST_GUILD, &t.ticket_id).await?;
        assert_eq!(stored.status, TicketStatus::Closed);
        assert!(h.provisioner.is_deleted(&channel_of(t)).await);
    }
    let failed = h.engine.get_ticket(TEST_GUILD, &b.ticket_id).await?;
    assert_eq!(failed.status, TicketStatus::Open);
    assert!(h.provisioner.is_live(&channel_of(&b)).await);
    Ok(())
}

#[tokio::test]
async fn test_hung_channel_calls_are_bounded() -> Result<(), Error> {
    let store = Arc::new(InMemoryStore::new());
    let h = TestHarness::with_parts(
        store.clone(),
        store,
        Arc::new(FakeProvisioner::new()),
        tight_config(Duration::from_millis(50)),
    );
    h.configure_guild(TEST_GUILD).await?;
    let hung = h.open_ticket(TEST_GUILD, "42").await?;
    let healthy = h.open_ticket(TEST_GUILD, "43").await?;
    let by_command = h.open_ticket(TEST_GUILD, "44").await?;
    h.provisioner.hang_channel(&channel_of(&hung)).await;
    h.provisioner.hang_channel(&channel_of(&by_command)).await;

    // Notice and delete on a hung channel each give up after the bound.
    let closed = tokio::time::timeout(
        Duration::from_secs(1),
        h.engine.close(TEST_GUILD, &channel_of(&by_command), "44", None),
    )
    .await
    .expect("command close returns")?;
    assert_eq!(closed.status, TicketStatus::Closed);

    // The existence check on a hung channel gives up; the sweep moves on.
    let report = tokio::time::timeout(Duration::from_secs(1), h.bulk.close_all_open(TEST_GUILD, "1"))
        .await
        .expect("bulk close returns")?;
    assert_eq!(report, BulkReport { attempted: 2, succeeded: 2, failed: 0 });

    let stored = h.engine.get_ticket(TEST_GUILD, &hung.ticket_id).await?;
    assert_eq!(stored.status, TicketStatus::Closed);
    assert!(!h.provisioner.is_deleted(&channel_of(&hung)).await);
    assert!(h.provisioner.is_deleted(&channel_of(&healthy)).await);
    Ok(())
}
