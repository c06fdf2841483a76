//! Concurrency properties of the session command handlers, exercised against
//! the in-memory store on a multi-thread runtime.

use std::sync::Arc;

use loreweave_core::repository::EventRepository;
use loreweave_event_store::memory_event_repository::InMemoryEventRepository;
use loreweave_session::application::command_handlers::{
    handle_assign_role, handle_initialize_world, handle_register_player, handle_submit_choice,
};
use loreweave_session::application::narration::NarrationService;
use loreweave_session::domain::commands::{
    AssignRole, InitializeWorld, RegisterPlayer, SubmitChoice,
};
use loreweave_session::domain::errors::SessionError;
use loreweave_session::domain::events::{
    ROLE_ASSIGNED_EVENT_TYPE, ROLE_SELECTION_OPENED_EVENT_TYPE, ROUND_ADVANCED_EVENT_TYPE,
};
use loreweave_test_support::FixedClock;
use tokio::task::JoinSet;
use uuid::Uuid;

const ROSTER: [&str; 4] = ["Warrior", "Mage", "Bard", "Druid"];

async fn initialize(repo: &InMemoryEventRepository, session_id: Uuid, capacity: usize) {
    handle_initialize_world(
        &InitializeWorld {
            correlation_id: Uuid::new_v4(),
            session_id,
            roster: ROSTER.iter().map(|r| (*r).to_owned()).collect(),
            capacity,
            lore: "An archipelago of floating bells.".into(),
            rules: "Each round, pick A, B, C or D.".into(),
        },
        &FixedClock::default_instant(),
        repo,
    )
    .await
    .unwrap();
}

async fn register(repo: &InMemoryEventRepository, session_id: Uuid, index: usize) {
    handle_register_player(
        &register_command(session_id, index),
        &FixedClock::default_instant(),
        repo,
    )
    .await
    .unwrap();
}

fn register_command(session_id: Uuid, index: usize) -> RegisterPlayer {
    RegisterPlayer {
        correlation_id: Uuid::new_v4(),
        session_id,
        world_id: None,
        player_id: format!("player-{index}"),
        character_name: format!("Hero {index}"),
        display_name: format!("@hero{index}"),
    }
}

async fn count_events(repo: &InMemoryEventRepository, session_id: Uuid, event_type: &str) -> usize {
    repo.load_events(session_id)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.event_type == event_type)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assign_role_for_same_role_has_one_winner() {
    // Arrange
    let session_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryEventRepository::new());
    let narration = Arc::new(NarrationService::fallback_only());
    initialize(&repo, session_id, 4).await;
    for index in 0..4 {
        register(&repo, session_id, index).await;
    }

    // Act
    let mut tasks = JoinSet::new();
    for index in 0..4 {
        let repo = Arc::clone(&repo);
        let narration = Arc::clone(&narration);
        tasks.spawn(async move {
            let command = AssignRole {
                correlation_id: Uuid::new_v4(),
                session_id,
                world_id: None,
                player_id: format!("player-{index}"),
                role: "Warrior".into(),
            };
            handle_assign_role(
                &command,
                &FixedClock::default_instant(),
                repo.as_ref(),
                narration.as_ref(),
            )
            .await
        });
    }

    let mut winners = 0;
    let mut unavailable = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(result) => {
                assert_eq!(result.outcome.role, "Warrior");
                winners += 1;
            }
            Err(SessionError::RoleUnavailable(role)) => {
                assert_eq!(role, "Warrior");
                unavailable += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // Assert
    assert_eq!(winners, 1);
    assert_eq!(unavailable, 3);
    assert_eq!(
        count_events(&repo, session_id, ROLE_ASSIGNED_EVENT_TYPE).await,
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_registrations_open_role_selection_exactly_once() {
    // Arrange
    let session_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryEventRepository::new());
    initialize(&repo, session_id, 3).await;

    // Act
    let mut tasks = JoinSet::new();
    for index in 0..6 {
        let repo = Arc::clone(&repo);
        tasks.spawn(async move {
            handle_register_player(
                &register_command(session_id, index),
                &FixedClock::default_instant(),
                repo.as_ref(),
            )
            .await
        });
    }

    let mut registered = 0;
    let mut turned_away = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => registered += 1,
            Err(SessionError::CapacityReached { capacity, roster }) => {
                assert_eq!(capacity, 3);
                assert_eq!(roster.len(), ROSTER.len());
                turned_away += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // Assert
    assert_eq!(registered, 3);
    assert_eq!(turned_away, 3);
    assert_eq!(
        count_events(&repo, session_id, ROLE_SELECTION_OPENED_EVENT_TYPE).await,
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_final_submissions_advance_round_once() {
    // Arrange
    let session_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryEventRepository::new());
    let narration = Arc::new(NarrationService::fallback_only());
    initialize(&repo, session_id, 4).await;
    for index in 0..4 {
        register(&repo, session_id, index).await;
    }
    for (index, role) in ROSTER.iter().enumerate() {
        handle_assign_role(
            &AssignRole {
                correlation_id: Uuid::new_v4(),
                session_id,
                world_id: None,
                player_id: format!("player-{index}"),
                role: (*role).to_owned(),
            },
            &FixedClock::default_instant(),
            repo.as_ref(),
            &narration,
        )
        .await
        .unwrap();
    }

    // Act
    let mut tasks = JoinSet::new();
    for (index, choice) in ["A", "B", "C", "D"].into_iter().enumerate() {
        let repo = Arc::clone(&repo);
        let narration = Arc::clone(&narration);
        tasks.spawn(async move {
            let command = SubmitChoice {
                correlation_id: Uuid::new_v4(),
                session_id,
                world_id: None,
                player_id: format!("player-{index}"),
                choice: choice.to_owned(),
            };
            handle_submit_choice(
                &command,
                &FixedClock::default_instant(),
                repo.as_ref(),
                narration.as_ref(),
            )
            .await
        });
    }

    let mut completions = 0;
    while let Some(joined) = tasks.join_next().await {
        let ack = joined.unwrap().unwrap().outcome;
        assert_eq!(ack.round, 1);
        if let Some(completed) = ack.completed {
            assert_eq!(completed.round, 1);
            completions += 1;
        }
    }

    // Assert
    assert_eq!(completions, 1);
    assert_eq!(
        count_events(&repo, session_id, ROUND_ADVANCED_EVENT_TYPE).await,
        1
    );
}
