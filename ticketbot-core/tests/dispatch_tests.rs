// tests/dispatch_tests.rs
use std::time::Duration;

use ticketbot_common::models::TicketStatus;
use ticketbot_core::cache::RateLimitPolicy;
use ticketbot_core::services::config_service::ConfigChange;
use ticketbot_core::services::dispatch::{
    ActionResult, DispatchOutcome, InboundRequest, RequestSource, TicketAction,
};
use ticketbot_core::test_utils::helpers::*;
use ticketbot_core::Error;

fn request(actor: &str, channel: Option<&str>, source: RequestSource, action: TicketAction) -> InboundRequest {
    InboundRequest {
        guild_id: TEST_GUILD.to_string(),
        channel_id: channel.map(str::to_string),
        actor_id: actor.to_string(),
        actor_tag: format!("user{actor}"),
        source,
        action,
    }
}

fn create() -> TicketAction {
    TicketAction::Create { template_index: 0, reason: None, description: None }
}

#[tokio::test]
async fn test_sixth_call_in_window_is_rate_limited() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let dispatcher = h.dispatcher(RateLimitPolicy::default());

    for i in 0..5 {
        let outcome = dispatcher
            .dispatch(request("42", None, RequestSource::SlashCommand, TicketAction::Stats))
            .await;
        assert!(outcome.is_completed(), "call {i} should pass: {outcome:?}");
    }
    let sixth = dispatcher
        .dispatch(request("42", None, RequestSource::SlashCommand, TicketAction::Stats))
        .await;
    assert!(matches!(sixth, DispatchOutcome::RateLimited));

    // Separate budgets per user and per command.
    let other_user = dispatcher
        .dispatch(request("43", None, RequestSource::SlashCommand, TicketAction::Stats))
        .await;
    assert!(other_user.is_completed());
    let other_command = dispatcher
        .dispatch(request("42", None, RequestSource::SlashCommand, TicketAction::Configure(ConfigChange::Show)))
        .await;
    assert!(other_command.is_completed());
    Ok(())
}

#[tokio::test]
async fn test_budget_recovers_after_window() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let dispatcher = h.dispatcher(RateLimitPolicy { max_attempts: 1, window: Duration::from_millis(50) });

    let stats = || request("42", None, RequestSource::Button, TicketAction::Stats);
    assert!(dispatcher.dispatch(stats()).await.is_completed());
    assert!(matches!(dispatcher.dispatch(stats()).await, DispatchOutcome::RateLimited));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(dispatcher.dispatch(stats()).await.is_completed());
    Ok(())
}

#[tokio::test]
async fn test_slash_commands_disabled() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    h.configs.set_slash_commands(TEST_GUILD, false).await?;
    let dispatcher = h.dispatcher(RateLimitPolicy::default());

    let slash = dispatcher
        .dispatch(request("42", None, RequestSource::SlashCommand, create()))
        .await;
    assert!(matches!(slash, DispatchOutcome::SlashCommandsDisabled));
    assert_eq!(h.store.ticket_count(), 0);

    // Buttons and /config keep working, so the toggle can be turned back on.
    let button = dispatcher
        .dispatch(request("42", None, RequestSource::Button, create()))
        .await;
    assert!(button.is_completed(), "{button:?}");

    let toggle = dispatcher
        .dispatch(request(
            "1",
            None,
            RequestSource::SlashCommand,
            TicketAction::Configure(ConfigChange::SetSlashCommands(true)),
        ))
        .await;
    match toggle {
        DispatchOutcome::Completed(ActionResult::Config(cfg)) => assert!(cfg.use_slash_commands),
        other => panic!("expected config result, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_preconditions_are_rejected_not_failed() -> Result<(), Error> {
    let h = TestHarness::new();
    let dispatcher = h.dispatcher(RateLimitPolicy::default());

    // No category configured yet.
    let outcome = dispatcher
        .dispatch(request("42", None, RequestSource::SlashCommand, create()))
        .await;
    assert!(matches!(outcome, DispatchOutcome::Rejected(Error::NotConfigured(_))), "{outcome:?}");

    // Channel-scoped action outside any channel.
    let outcome = dispatcher
        .dispatch(request("42", None, RequestSource::Button, TicketAction::Claim))
        .await;
    assert!(matches!(outcome, DispatchOutcome::Rejected(Error::NotFound(_))));

    let outcome = dispatcher
        .dispatch(request("1", None, RequestSource::SlashCommand, TicketAction::CloseInactive { days: 0 }))
        .await;
    assert!(matches!(outcome, DispatchOutcome::Rejected(Error::InvalidConfig(_))));
    Ok(())
}

#[tokio::test]
async fn test_provisioning_failure_is_reported_as_failed() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    h.provisioner.set_fail_create(true).await;
    let dispatcher = h.dispatcher(RateLimitPolicy::default());

    let outcome = dispatcher
        .dispatch(request("42", None, RequestSource::ModalSubmit, create()))
        .await;
    match outcome {
        DispatchOutcome::Failed(msg) => assert!(msg.contains("provisioning"), "{msg}"),
        other => panic!("expected Failed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_ticket_flow_through_dispatcher() -> Result<(), Error> {
    let h = TestHarness::new();
    h.configure_guild(TEST_GUILD).await?;
    let dispatcher = h.dispatcher(RateLimitPolicy::default());

    let ticket = match dispatcher
        .dispatch(request("42", None, RequestSource::SlashCommand, create()))
        .await
    {
        DispatchOutcome::Completed(ActionResult::Ticket(t)) => t,
        other => panic!("create failed: {other:?}"),
    };
    let channel = ticket.channel_id.clone().expect("channel");

    let outcome = dispatcher
        .dispatch(request("7", Some(&channel), RequestSource::Button, TicketAction::Claim))
        .await;
    assert!(outcome.is_completed());

    let outcome = dispatcher
        .dispatch(request(
            "7",
            Some(&channel),
            RequestSource::Button,
            TicketAction::Close { reason: Some("done".into()) },
        ))
        .await;
    assert!(outcome.is_completed());

    match dispatcher
        .dispatch(request(
            "7",
            None,
            RequestSource::SlashCommand,
            TicketAction::List { status: Some(TicketStatus::Closed) },
        ))
        .await
    {
        DispatchOutcome::Completed(ActionResult::Tickets(list)) => assert_eq!(list.len(), 1),
        other => panic!("list failed: {other:?}"),
    }

    let again = dispatcher
        .dispatch(request("7", Some(&channel), RequestSource::Button, TicketAction::Close { reason: None }))
        .await;
    assert!(matches!(again, DispatchOutcome::Rejected(Error::AlreadyClosed(_))));
    Ok(())
}

#[tokio::test]
async fn test_stats_can_be_disabled() -> Result<(), Error> {
    let h = TestHarness::new();
    h.edit_config(TEST_GUILD, |cfg| cfg.features.stats = false).await?;
    let dispatcher = h.dispatcher(RateLimitPolicy::default());

    let outcome = dispatcher
        .dispatch(request("42", None, RequestSource::SlashCommand, TicketAction::Stats))
        .await;
    assert!(matches!(outcome, DispatchOutcome::Rejected(Error::NotConfigured(_))));
    Ok(())
}
