//! Integration tests for queue-keeper
//!
//! These drive the coordinator through the messaging hub the way the AMQP
//! consumer does, with a recording session factory standing in for the
//! player-facing sessions.

mod fixtures;

use fixtures::{notice_texts, pending, ticket, SessionEvent, TestSystem};
use futures::future::join_all;
use proptest::prelude::*;
use queue_keeper::coordinator::SessionState;
use async_trait::async_trait;
use queue_keeper::error::Result;
use queue_keeper::rpc::{DequeueResult, MatchmakerService, QueueResult, StaticMatchmakerService};
use queue_keeper::session::DeleteReason;
use queue_keeper::types::{
    Match, MatchCreated, MatchmakerMessage, PendingMatchCreated, PendingMatchDeleteReason,
    PendingMatchDeleted, PendingMatchUpdated, Ticket, TicketCreated, TicketDeleteReason,
    TicketDeleted, TicketUpdated,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Notify;

fn created(ticket: Ticket) -> MatchmakerMessage {
    MatchmakerMessage::TicketCreated(TicketCreated { ticket })
}

fn updated(old_ticket: Ticket, new_ticket: Ticket) -> MatchmakerMessage {
    MatchmakerMessage::TicketUpdated(TicketUpdated {
        old_ticket,
        new_ticket,
    })
}

fn deleted(ticket: Ticket, reason: TicketDeleteReason) -> MatchmakerMessage {
    MatchmakerMessage::TicketDeleted(TicketDeleted { ticket, reason })
}

#[tokio::test]
async fn test_ticket_lifecycle_keeps_invariant() {
    let system = TestSystem::new();
    let everyone = ["a", "b", "c", "remote"];
    system.connect("a");
    system.connect("b");
    system.connect("c");

    assert_eq!(system.hub.dispatch_message(&created(ticket("t1", &["a", "b", "remote"]))), 1);
    system.assert_invariant(&everyone);
    assert_eq!(system.coordinator.session_count(), 2);

    system.hub.dispatch_message(&updated(
        ticket("t1", &["a", "b", "remote"]),
        ticket("t1", &["b", "c", "remote"]),
    ));
    system.assert_invariant(&everyone);

    system.hub.dispatch_message(&created(ticket("t2", &["a"])));
    system.assert_invariant(&everyone);

    system.hub.dispatch_message(&deleted(
        ticket("t1", &["b", "c", "remote"]),
        TicketDeleteReason::ManualDequeue,
    ));
    system.assert_invariant(&everyone);
    assert_eq!(system.coordinator.session_player_ids(), vec!["a".to_string()]);

    system.disconnect("a");
    system.assert_invariant(&["b", "c", "remote"]);
    assert_eq!(system.coordinator.session_count(), 0);
}

#[tokio::test]
async fn test_ticket_update_diffs_membership() {
    let system = TestSystem::new();
    for id in ["a", "b", "c"] {
        system.connect(id);
    }

    system.hub.dispatch_message(&created(ticket("t1", &["a", "b"])));
    system.log.clear();

    system
        .hub
        .dispatch_message(&updated(ticket("t1", &["a", "b"]), ticket("t1", &["b", "c"])));

    assert!(!system.coordinator.has_session("a"));
    assert_eq!(
        system.log.events_for("a"),
        vec![
            SessionEvent::Deleted {
                player: "a".to_string(),
                reason: DeleteReason::Unknown
            },
            SessionEvent::Destroyed {
                player: "a".to_string()
            },
        ]
    );

    assert_eq!(
        system.log.events_for("b"),
        vec![SessionEvent::TicketSet {
            player: "b".to_string(),
            ticket: "t1".to_string()
        }]
    );
    assert_eq!(
        system.coordinator.session_ticket("b").map(|t| t.player_ids),
        Some(vec!["b".to_string(), "c".to_string()])
    );

    assert_eq!(
        system.log.events_for("c"),
        vec![SessionEvent::Created {
            player: "c".to_string(),
            ticket: "t1".to_string()
        }]
    );

    let cached = system.coordinator.store().get_ticket("t1").unwrap().unwrap();
    assert_eq!(cached.player_ids, vec!["b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_update_of_uncached_ticket_uses_old_membership() {
    let system = TestSystem::new();
    system.connect("c");

    system.hub.dispatch_message(&updated(
        ticket("t1", &["remote_a"]),
        ticket("t1", &["remote_a", "c"]),
    ));

    assert!(system.coordinator.has_session("c"));
    assert!(system.coordinator.store().contains_ticket("t1").unwrap());
}

#[tokio::test]
async fn test_missing_local_state_is_a_no_op() {
    let system = TestSystem::new();
    system.connect("a");

    system.hub.dispatch_message(&deleted(
        ticket("never_cached", &["a"]),
        TicketDeleteReason::ManualDequeue,
    ));
    system.coordinator.handle_player_disconnect("nobody");
    system.coordinator.handle_player_disconnect("a");

    assert!(system.log.events().is_empty());
    assert_eq!(system.coordinator.session_count(), 0);

    let stats = system.coordinator.get_stats().unwrap();
    assert_eq!(stats.events_failed, 0);
    assert_eq!(stats.sessions_destroyed, 0);
}

#[tokio::test]
async fn test_pending_match_reaches_whole_party() {
    let system = TestSystem::new();
    system.connect("x");
    system.connect("y");
    system.hub.dispatch_message(&created(ticket("t1", &["x", "y"])));

    system
        .hub
        .dispatch_message(&MatchmakerMessage::PendingMatchCreated(PendingMatchCreated {
            pending_match: pending("m1", &["t1", "t_elsewhere"]),
        }));

    for player in ["x", "y"] {
        assert_eq!(
            system.log.count(|event| event
                == &SessionEvent::PendingMatchCreated {
                    player: player.to_string(),
                    pending_match: "m1".to_string()
                }),
            1
        );
        assert_eq!(
            system.coordinator.session_state(player),
            Some(SessionState::PendingMatch("m1".to_string()))
        );
    }

    system
        .hub
        .dispatch_message(&MatchmakerMessage::PendingMatchUpdated(PendingMatchUpdated {
            pending_match: pending("m1", &["t1"]),
        }));
    assert_eq!(
        system
            .log
            .count(|event| matches!(event, SessionEvent::PendingMatchUpdated { .. })),
        2
    );
}

#[tokio::test]
async fn test_pending_match_for_foreign_tickets_is_ignored() {
    let system = TestSystem::new();
    system.connect("x");
    system.hub.dispatch_message(&created(ticket("t1", &["x"])));

    system
        .hub
        .dispatch_message(&MatchmakerMessage::PendingMatchCreated(PendingMatchCreated {
            pending_match: pending("m1", &["t_elsewhere"]),
        }));

    assert_eq!(system.coordinator.session_state("x"), Some(SessionState::Queued));
    assert!(system.coordinator.store().get_pending_match("m1").unwrap().is_none());
}

#[tokio::test]
async fn test_finalized_pending_match_is_not_cancelled() {
    let system = TestSystem::new();
    system.connect("x");
    system.connect("y");
    system.hub.dispatch_message(&created(ticket("t1", &["x"])));
    system.hub.dispatch_message(&created(ticket("t2", &["y"])));
    system
        .hub
        .dispatch_message(&MatchmakerMessage::PendingMatchCreated(PendingMatchCreated {
            pending_match: pending("m1", &["t1", "t2"]),
        }));

    system
        .hub
        .dispatch_message(&MatchmakerMessage::PendingMatchDeleted(PendingMatchDeleted {
            pending_match: pending("m1", &["t1", "t2"]),
            reason: PendingMatchDeleteReason::MatchCreated,
        }));

    assert_eq!(
        system
            .log
            .count(|event| matches!(event, SessionEvent::PendingMatchCancelled { .. })),
        0
    );
    assert!(system.coordinator.has_session("x"));
    assert!(system.coordinator.has_session("y"));

    system
        .hub
        .dispatch_message(&MatchmakerMessage::MatchCreated(MatchCreated {
            created_match: Match {
                id: "match1".to_string(),
                game_mode_id: "duel".to_string(),
                tickets: vec![ticket("t1", &["x"]), ticket("t2", &["y"])],
            },
        }));

    for player in ["x", "y"] {
        assert!(!system.coordinator.has_session(player));
        assert!(system.log.events_for(player).contains(&SessionEvent::Deleted {
            player: player.to_string(),
            reason: DeleteReason::MatchCreated
        }));
    }
    assert_eq!(system.coordinator.store().ticket_count(), 0);
    assert_eq!(system.coordinator.store().pending_match_count(), 0);

    // The matchmaker also deletes the tickets; nothing is left to tear down
    system.hub.dispatch_message(&deleted(ticket("t1", &["x"]), TicketDeleteReason::MatchCreated));
    assert_eq!(
        system
            .log
            .count(|event| matches!(event, SessionEvent::Destroyed { .. })),
        2
    );
}

#[tokio::test]
async fn test_cancelled_pending_match_requeues_sessions() {
    let system = TestSystem::new();
    system.connect("x");
    system.hub.dispatch_message(&created(ticket("t1", &["x"])));
    system
        .hub
        .dispatch_message(&MatchmakerMessage::PendingMatchCreated(PendingMatchCreated {
            pending_match: pending("m1", &["t1", "t2"]),
        }));

    system
        .hub
        .dispatch_message(&MatchmakerMessage::PendingMatchDeleted(PendingMatchDeleted {
            pending_match: pending("m1", &["t1", "t2"]),
            reason: PendingMatchDeleteReason::TicketDeleted,
        }));

    assert!(system.log.events_for("x").contains(&SessionEvent::PendingMatchCancelled {
        player: "x".to_string(),
        pending_match: "m1".to_string()
    }));
    assert_eq!(system.coordinator.session_state("x"), Some(SessionState::Queued));
}

#[tokio::test]
async fn test_match_created_tears_down_uncached_players() {
    let system = TestSystem::new();
    system.connect("x");
    system.hub.dispatch_message(&created(ticket("t1", &["x"])));

    // The match carries a different ticket id than the one cached here
    system
        .hub
        .dispatch_message(&MatchmakerMessage::MatchCreated(MatchCreated {
            created_match: Match {
                id: "match1".to_string(),
                game_mode_id: "duel".to_string(),
                tickets: vec![ticket("t9", &["x", "remote"])],
            },
        }));

    assert!(!system.coordinator.has_session("x"));
}

#[tokio::test]
async fn test_login_restores_queue() {
    let system = TestSystem::with_matchmaker(
        StaticMatchmakerService::new().with_ticket(ticket("t1", &["x"])),
    );

    let player = system.login("x").await;

    assert!(system.coordinator.has_session("x"));
    assert_eq!(
        system.log.events_for("x"),
        vec![SessionEvent::Created {
            player: "x".to_string(),
            ticket: "t1".to_string()
        }]
    );
    assert!(system.coordinator.store().contains_ticket("t1").unwrap());
    assert_eq!(
        notice_texts(&player),
        vec!["Your queue for Duel has been transferred!"]
    );
    assert_eq!(system.coordinator.get_stats().unwrap().restores_succeeded, 1);
}

#[tokio::test]
async fn test_login_without_ticket_is_silent() {
    let system = TestSystem::new();

    let player = system.login("x").await;

    assert!(!system.coordinator.has_session("x"));
    assert!(notice_texts(&player).is_empty());
}

#[tokio::test]
async fn test_login_with_unknown_mode_creates_no_session() {
    let system = TestSystem::with_matchmaker(
        StaticMatchmakerService::new().with_ticket(Ticket::new(
            "t1",
            "retired_mode",
            vec!["x".to_string()],
        )),
    );

    let player = system.login("x").await;

    assert!(!system.coordinator.has_session("x"));
    assert_eq!(
        notice_texts(&player),
        vec!["Your queue for retired_mode could not be transferred! Please tell a staff member."]
    );
    assert_eq!(system.coordinator.get_stats().unwrap().restores_failed, 1);
}

#[tokio::test]
async fn test_login_rpc_failure_creates_no_session() {
    let matchmaker = StaticMatchmakerService::new().with_ticket(ticket("t1", &["x"]));
    matchmaker.fail_with(Some("broker down"));
    let system = TestSystem::with_matchmaker(matchmaker);

    let player = system.login("x").await;

    assert!(!system.coordinator.has_session("x"));
    assert!(!system.coordinator.store().contains_ticket("t1").unwrap());
    assert_eq!(notice_texts(&player).len(), 1);
}

/// Matchmaker whose queue lookups stall until released, then answer with a
/// snapshot taken before the stall
struct StalledMatchmaker {
    snapshot: Ticket,
    entered: Notify,
    release: Notify,
}

impl StalledMatchmaker {
    fn new(snapshot: Ticket) -> Self {
        Self {
            snapshot,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Run `during` while a lookup is in flight, then let the lookup finish
    async fn while_stalled(&self, during: impl FnOnce()) {
        self.entered.notified().await;
        during();
        self.release.notify_one();
    }
}

#[async_trait]
impl MatchmakerService for StalledMatchmaker {
    async fn get_player_queue_info(&self, _player_id: &str) -> Result<Option<Ticket>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Some(self.snapshot.clone()))
    }

    async fn queue_player(&self, _game_mode_id: &str, _player_id: &str) -> Result<QueueResult> {
        Ok(QueueResult::Success)
    }

    async fn dequeue_player(&self, _player_id: &str) -> Result<DequeueResult> {
        Ok(DequeueResult::Success)
    }
}

#[tokio::test]
async fn test_update_during_login_lookup_is_not_overwritten() {
    let matchmaker = Arc::new(StalledMatchmaker::new(ticket("t1", &["x"])));
    let system = TestSystem::with_service(matchmaker.clone());
    let x = system.connect("x");
    system.connect("y");

    tokio::join!(
        system.coordinator.handle_player_login("x"),
        matchmaker.while_stalled(|| {
            system.hub.dispatch_message(&updated(
                ticket("t1", &["x"]),
                ticket("t1", &["x", "y"]),
            ));
        }),
    );

    // The stale lookup result must not replace the newer cached party
    let cached = system.coordinator.store().get_ticket("t1").unwrap().unwrap();
    assert_eq!(cached.player_ids, vec!["x", "y"]);
    assert!(system.coordinator.has_session("x"));
    assert!(system.coordinator.has_session("y"));
    assert_eq!(
        notice_texts(&x),
        vec!["Your queue for Duel has been transferred!"]
    );

    system.hub.dispatch_message(&updated(
        ticket("t1", &["x", "y"]),
        ticket("t1", &["x"]),
    ));

    assert!(system.coordinator.has_session("x"));
    assert!(!system.coordinator.has_session("y"));
    assert_eq!(
        system.log.count(|event| matches!(
            event,
            SessionEvent::Deleted { player, reason: DeleteReason::Unknown } if player == "y"
        )),
        1
    );
    system.assert_invariant(&["x", "y"]);
}

#[tokio::test]
async fn test_leaving_during_login_lookup_skips_restore() {
    let matchmaker = Arc::new(StalledMatchmaker::new(ticket("t1", &["x", "y"])));
    let system = TestSystem::with_service(matchmaker.clone());
    let x = system.connect("x");
    system.connect("y");

    tokio::join!(
        system.coordinator.handle_player_login("x"),
        matchmaker.while_stalled(|| {
            system.hub.dispatch_message(&updated(
                ticket("t1", &["x", "y"]),
                ticket("t1", &["y"]),
            ));
        }),
    );

    assert!(!system.coordinator.has_session("x"));
    assert!(system.coordinator.has_session("y"));
    let cached = system.coordinator.store().get_ticket("t1").unwrap().unwrap();
    assert_eq!(cached.player_ids, vec!["y"]);
    assert!(notice_texts(&x).is_empty());
    system.assert_invariant(&["x", "y"]);
}

#[tokio::test]
async fn test_disconnect_then_delete_sends_nothing() {
    let system = TestSystem::new();
    let player = system.connect("x");
    system.hub.dispatch_message(&created(ticket("t1", &["x"])));

    system.disconnect("x");
    assert!(system.coordinator.store().contains_ticket("t1").unwrap());

    system.hub.dispatch_message(&deleted(
        ticket("t1", &["x"]),
        TicketDeleteReason::ManualDequeue,
    ));

    assert_eq!(
        system.log.events_for("x"),
        vec![
            SessionEvent::Created {
                player: "x".to_string(),
                ticket: "t1".to_string()
            },
            SessionEvent::Destroyed {
                player: "x".to_string()
            },
        ]
    );
    assert!(!system.coordinator.store().contains_ticket("t1").unwrap());
    assert!(notice_texts(&player).is_empty());
}

#[tokio::test]
async fn test_party_member_disconnect_keeps_ticket_for_others() {
    let system = TestSystem::new();
    system.connect("x");
    system.connect("y");
    system.hub.dispatch_message(&created(ticket("t1", &["x", "y"])));

    system.disconnect("x");

    assert!(system.coordinator.has_session("y"));
    assert!(system.coordinator.store().contains_ticket("t1").unwrap());

    system.hub.dispatch_message(&deleted(
        ticket("t1", &["x", "y"]),
        TicketDeleteReason::GameModeDeleted,
    ));
    assert!(system.log.events_for("y").contains(&SessionEvent::Deleted {
        player: "y".to_string(),
        reason: DeleteReason::GameModeDeleted
    }));
    assert!(!system.log.events_for("x").iter().any(|event| matches!(
        event,
        SessionEvent::Deleted { .. }
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_delivery_across_tickets() {
    let system = Arc::new(TestSystem::new());
    let players: Vec<String> = (0..64).map(|i| format!("player_{}", i)).collect();
    for player in &players {
        system.connect(player);
    }

    let deliveries = players.iter().enumerate().map(|(i, player)| {
        let system = system.clone();
        let message = created(Ticket::new(
            format!("t{}", i),
            "duel",
            vec![player.clone(), format!("remote_{}", i)],
        ));
        tokio::spawn(async move {
            system.hub.dispatch_message(&message);
            system.hub.dispatch_message(&message);
        })
    });
    for result in join_all(deliveries).await {
        result.unwrap();
    }

    assert_eq!(system.coordinator.session_count(), players.len());
    assert_eq!(system.coordinator.store().ticket_count(), players.len());
    assert_eq!(
        system
            .log
            .count(|event| matches!(event, SessionEvent::Created { .. })),
        players.len()
    );

    // Half of them leave while the other half are dequeued remotely
    let teardown = players.iter().enumerate().map(|(i, player)| {
        let system = system.clone();
        let player = player.clone();
        tokio::spawn(async move {
            if i % 2 == 0 {
                system.disconnect(&player);
            } else {
                system.hub.dispatch_message(&deleted(
                    Ticket::new(format!("t{}", i), "duel", vec![player.clone()]),
                    TicketDeleteReason::ManualDequeue,
                ));
            }
        })
    });
    for result in join_all(teardown).await {
        result.unwrap();
    }

    assert_eq!(system.coordinator.session_count(), 0);
    assert_eq!(system.coordinator.store().ticket_count(), players.len() / 2);
    assert_eq!(system.coordinator.get_stats().unwrap().events_failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins() {
    let mut matchmaker = StaticMatchmakerService::new();
    for i in 0..16 {
        matchmaker = matchmaker.with_ticket(Ticket::new(
            format!("t{}", i),
            "block_sumo",
            vec![format!("player_{}", i)],
        ));
    }
    let system = Arc::new(TestSystem::with_matchmaker(matchmaker));

    let logins = (0..32).map(|i| {
        let system = system.clone();
        tokio::spawn(async move { system.login(&format!("player_{}", i)).await })
    });
    let players: Vec<_> = join_all(logins)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    assert_eq!(system.coordinator.session_count(), 16);
    let restored = players
        .iter()
        .filter(|player| {
            notice_texts(player) == vec!["Your queue for Block Sumo has been transferred!"]
        })
        .count();
    assert_eq!(restored, 16);
}

/// Observable coordinator state for a fixed universe of ids
fn snapshot(system: &TestSystem) -> BTreeMap<String, String> {
    let mut state = BTreeMap::new();
    for player in PLAYERS {
        if let (Some(session_state), Some(ticket)) = (
            system.coordinator.session_state(player),
            system.coordinator.session_ticket(player),
        ) {
            state.insert(
                format!("session:{}", player),
                format!("{:?} {:?}", session_state, ticket.player_ids),
            );
        }
    }
    for ticket_id in TICKETS {
        if let Some(ticket) = system.coordinator.store().get_ticket(ticket_id).unwrap() {
            state.insert(format!("ticket:{}", ticket_id), format!("{:?}", ticket.player_ids));
        }
    }
    for match_id in ["m1", "m2"] {
        if let Some(pending_match) = system.coordinator.store().get_pending_match(match_id).unwrap() {
            state.insert(
                format!("pending:{}", match_id),
                format!("{:?}", pending_match.ticket_ids),
            );
        }
    }
    state
}

const PLAYERS: [&str; 5] = ["a", "b", "c", "d", "remote"];
const ONLINE: [&str; 4] = ["a", "b", "c", "d"];
const TICKETS: [&str; 3] = ["t1", "t2", "t3"];

fn members_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(PLAYERS.to_vec(), 1..=3)
        .prop_map(|members| members.into_iter().map(String::from).collect())
}

fn ticket_strategy() -> impl Strategy<Value = Ticket> {
    (proptest::sample::select(TICKETS.to_vec()), members_strategy())
        .prop_map(|(id, members)| Ticket::new(id, "duel", members))
}

fn message_strategy() -> impl Strategy<Value = MatchmakerMessage> {
    prop_oneof![
        ticket_strategy().prop_map(created),
        (ticket_strategy(), members_strategy()).prop_map(|(old_ticket, members)| {
            let new_ticket = Ticket::new(old_ticket.id.clone(), "duel", members);
            updated(old_ticket, new_ticket)
        }),
        ticket_strategy().prop_map(|t| deleted(t, TicketDeleteReason::ManualDequeue)),
        (
            proptest::sample::select(vec!["m1", "m2"]),
            proptest::sample::subsequence(TICKETS.to_vec(), 1..=2)
        )
            .prop_map(|(id, tickets)| {
                MatchmakerMessage::PendingMatchCreated(PendingMatchCreated {
                    pending_match: pending(id, &tickets),
                })
            }),
        (
            proptest::sample::select(vec!["m1", "m2"]),
            proptest::sample::subsequence(TICKETS.to_vec(), 1..=2)
        )
            .prop_map(|(id, tickets)| {
                MatchmakerMessage::PendingMatchDeleted(PendingMatchDeleted {
                    pending_match: pending(id, &tickets),
                    reason: PendingMatchDeleteReason::TicketDeleted,
                })
            }),
    ]
}

fn online_system() -> TestSystem {
    let system = TestSystem::new();
    for player in ONLINE {
        system.connect(player);
    }
    system
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_redelivery_is_idempotent(messages in proptest::collection::vec(message_strategy(), 1..12)) {
        let once = online_system();
        let twice = online_system();

        for message in &messages {
            once.hub.dispatch_message(message);
            twice.hub.dispatch_message(message);
            twice.hub.dispatch_message(message);
        }

        prop_assert_eq!(snapshot(&once), snapshot(&twice));
    }

    #[test]
    fn prop_update_diffs_party(old in members_strategy(), new in members_strategy()) {
        let system = online_system();
        let old_ticket = Ticket::new("t1", "duel", old.clone());
        let new_ticket = Ticket::new("t1", "duel", new.clone());

        system.hub.dispatch_message(&created(old_ticket.clone()));
        system.log.clear();
        system.hub.dispatch_message(&updated(old_ticket, new_ticket));

        for player in ONLINE {
            let in_old = old.iter().any(|id| id == player);
            let in_new = new.iter().any(|id| id == player);
            let events = system.log.events_for(player);

            prop_assert_eq!(system.coordinator.has_session(player), in_new);

            if in_old && !in_new {
                prop_assert!(events.contains(&SessionEvent::Deleted {
                    player: player.to_string(),
                    reason: DeleteReason::Unknown,
                }), "expected Deleted event for {}", player);
            }
            if in_old && in_new {
                prop_assert!(!events.iter().any(|e| matches!(e, SessionEvent::Created { .. })), "unexpected Created event for {}", player);
                prop_assert_eq!(
                    system.coordinator.session_ticket(player).map(|t| t.player_ids),
                    Some(new.clone())
                );
            }
            if !in_old && in_new {
                prop_assert!(events.iter().any(|e| matches!(e, SessionEvent::Created { .. })), "expected Created event for {}", player);
            }
        }
    }
}
