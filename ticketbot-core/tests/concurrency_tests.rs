// tests/concurrency_tests.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ticketbot_common::models::{TicketFilter, TicketStatus};
use ticketbot_core::services::ticket_id::parse_ticket_sequence;
use ticketbot_core::test_utils::helpers::*;
use ticketbot_core::Error;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_closes_commit_exactly_once() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let ticket = h.open_ticket(TEST_GUILD, "42").await?;
    let channel = ticket.channel_id.clone().expect("channel");
    let mut rx = h.bus.subscribe(Some(64)).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = h.engine.clone();
        let channel = channel.clone();
        handles.push(tokio::spawn(async move {
            engine.close(TEST_GUILD, &channel, &format!("actor{i}"), None).await
        }));
    }

    let mut ok = 0;
    let mut already_closed = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => ok += 1,
            Err(Error::AlreadyClosed(_)) => already_closed += 1,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(already_closed, 7);

    let deletes = h
        .provisioner
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, ProvisionCall::Delete(_)))
        .count();
    assert_eq!(deletes, 1, "channel is deleted once");

    let event = rx.recv().await.expect("closed event");
    assert_eq!(event.status, TicketStatus::Closed);
    assert!(rx.try_recv().is_err(), "only one transition is published");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let ticket = h.open_ticket(TEST_GUILD, "42").await?;
    let channel = ticket.channel_id.clone().expect("channel");

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = h.engine.clone();
        let channel = channel.clone();
        handles.push(tokio::spawn(async move {
            engine.claim(TEST_GUILD, &channel, &format!("staff{i}")).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(t) => winners.push(t.claimed_by),
            Err(Error::AlreadyClaimed { .. }) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let stored = h.engine.get_ticket(TEST_GUILD, &ticket.ticket_id).await?;
    assert_eq!(stored.claimed_by, winners[0]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_respect_author_limit() -> Result<(), Error> {
    // A slow provisioner widens the gap between count check and save.
    let h = TestHarness::with_provisioner(Arc::new(FakeProvisioner::with_create_delay(
        Duration::from_millis(20),
    )));
    h.configure_guild(TEST_GUILD).await?;
    h.configs.set_max_tickets(TEST_GUILD, 3).await?;

    h.open_ticket(TEST_GUILD, "42").await?;
    h.open_ticket(TEST_GUILD, "42").await?;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.create_ticket(create_request(TEST_GUILD, "42")).await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => created += 1,
            Err(Error::LimitExceeded { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(rejected, 4);

    let open = h
        .engine
        .list_tickets(TEST_GUILD, &TicketFilter::open_by_author("42"))
        .await?;
    assert_eq!(open.len(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ids_are_unique_and_sequential() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;

    let mut handles = Vec::new();
    for author in 0..20 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.create_ticket(create_request(TEST_GUILD, &format!("{}", 1000 + author))).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.expect("task panicked")?.ticket_id);
    }

    let unique: HashSet<_> = ids.iter().cloned().collect();
    assert_eq!(unique.len(), 20, "duplicate ids: {ids:?}");

    let mut sequences: Vec<u64> = ids.iter().filter_map(|id| parse_ticket_sequence(id)).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ids_are_scoped_per_guild() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    h.configure_guild("200").await?;

    let a = h.open_ticket(TEST_GUILD, "42").await?;
    let b = h.open_ticket("200", "42").await?;
    assert_eq!(a.ticket_id, "TKT-0001");
    assert_eq!(b.ticket_id, "TKT-0001");

    let c = h.open_ticket(TEST_GUILD, "43").await?;
    assert_eq!(c.ticket_id, "TKT-0002");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_activity_during_close_does_not_resurrect_ticket() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let ticket = h.open_ticket(TEST_GUILD, "42").await?;
    let channel = ticket.channel_id.clone().expect("channel");

    let closer = {
        let engine = h.engine.clone();
        let channel = channel.clone();
        tokio::spawn(async move { engine.close(TEST_GUILD, &channel, "7", None).await })
    };
    let toucher = {
        let engine = h.engine.clone();
        let channel = channel.clone();
        tokio::spawn(async move { engine.record_activity(TEST_GUILD, &channel).await })
    };

    closer.await.expect("task panicked")?;
    toucher.await.expect("task panicked")?;

    let stored = h.engine.get_ticket(TEST_GUILD, &ticket.ticket_id).await?;
    assert_eq!(stored.status, TicketStatus::Closed);
    assert!(stored.invariants_hold());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_subscriber_does_not_block_the_ticket() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let ticket = h.open_ticket(TEST_GUILD, "42").await?;
    let channel = ticket.channel_id.clone().expect("channel");

    // One slot, never read: the claim fills it and the next publish waits.
    let mut rx = h.bus.subscribe(Some(1)).await;
    h.engine.claim(TEST_GUILD, &channel, "7").await?;

    let unclaimer = {
        let engine = h.engine.clone();
        let channel = channel.clone();
        tokio::spawn(async move { engine.unclaim(TEST_GUILD, &channel, "7").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!unclaimer.is_finished(), "unclaim should be waiting on the full queue");

    // The stalled publish holds no ticket lock.
    let touched = tokio::time::timeout(
        Duration::from_millis(500),
        h.engine.record_activity(TEST_GUILD, &channel),
    )
    .await
    .expect("activity is not blocked by a waiting publish")?;
    assert!(touched);

    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_some());
    let released = unclaimer.await.expect("task panicked")?;
    assert!(released.claimed_by.is_none());
    Ok(())
}
