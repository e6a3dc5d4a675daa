// tests/repository_tests.rs
//
// Runs against a live Postgres; set TEST_DATABASE_URL and use `--ignored`.

use chrono::Utc;

use ticketbot_common::models::{Ticket, TicketFilter, TicketStatus, Transcript};
use ticketbot_common::traits::{GuildConfigRepository, TicketRepository, TranscriptRepository};
use ticketbot_core::repositories::postgres::{
    PostgresGuildConfigRepository, PostgresTicketRepository, PostgresTranscriptRepository,
};
use ticketbot_core::test_utils::helpers::*;
use ticketbot_core::Error;

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_ticket_repository_round_trip() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresTicketRepository::new(db.pool().clone());

    let now = Utc::now();
    let mut ticket = Ticket::new_open("TKT-0001", TEST_GUILD, "42", "general", Some("help".into()), None, now);
    ticket.channel_id = Some("5001".into());
    repo.save_ticket(TEST_GUILD, &ticket).await?;

    let loaded = repo.get_ticket(TEST_GUILD, "TKT-0001").await?.expect("saved ticket");
    assert_eq!(loaded.author_id, "42");
    assert_eq!(loaded.status, TicketStatus::Open);
    assert_eq!(loaded.reason.as_deref(), Some("help"));

    let by_channel = repo.get_ticket_by_channel(TEST_GUILD, "5001").await?;
    assert_eq!(by_channel.map(|t| t.ticket_id), Some("TKT-0001".to_string()));

    // Upsert closes it.
    ticket.status = TicketStatus::Closed;
    ticket.closed_at = Some(now);
    ticket.closed_by = Some("7".into());
    repo.save_ticket(TEST_GUILD, &ticket).await?;

    let open = repo.get_all_tickets(TEST_GUILD, &TicketFilter::open_by_author("42")).await?;
    assert!(open.is_empty());
    let closed = repo
        .get_all_tickets(TEST_GUILD, &TicketFilter::with_status(TicketStatus::Closed))
        .await?;
    assert_eq!(closed.len(), 1);

    repo.delete_ticket(TEST_GUILD, "TKT-0001").await?;
    assert!(repo.get_ticket(TEST_GUILD, "TKT-0001").await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_ticket_sequence_is_per_guild() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresTicketRepository::new(db.pool().clone());

    assert_eq!(repo.next_ticket_sequence(TEST_GUILD).await?, 1);
    assert_eq!(repo.next_ticket_sequence(TEST_GUILD).await?, 2);
    assert_eq!(repo.next_ticket_sequence("200").await?, 1);
    Ok(())
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_guild_config_defaults_and_updates() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresGuildConfigRepository::new(db.pool().clone());

    let mut cfg = repo.get_guild_config(TEST_GUILD).await?;
    assert_eq!(cfg.max_tickets_per_user, 3);
    assert_eq!(repo.list_guild_ids().await?, vec![TEST_GUILD.to_string()]);

    cfg.ticket_category_id = Some(TEST_CATEGORY.into());
    cfg.staff_roles.push(TEST_STAFF_ROLE.into());
    repo.set_guild_config(TEST_GUILD, &cfg).await?;

    let reloaded = repo.get_guild_config(TEST_GUILD).await?;
    assert_eq!(reloaded, cfg);
    Ok(())
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_transcript_repository() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresTranscriptRepository::new(db.pool().clone());

    let transcript = Transcript::from_messages(
        TEST_GUILD,
        "TKT-0001",
        vec![message("1", "42", "hello", 2), message("2", "7", "hi", 1)],
        Utc::now(),
    );
    repo.save_transcript(&transcript).await?;

    let loaded = repo.get_transcript(TEST_GUILD, "TKT-0001").await?.expect("saved transcript");
    assert_eq!(loaded.text, transcript.text);
    assert_eq!(loaded.messages.len(), 2);
    assert!(repo.get_transcript(TEST_GUILD, "TKT-0002").await?.is_none());
    Ok(())
}
