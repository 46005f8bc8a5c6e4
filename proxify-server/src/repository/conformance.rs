//! Behaviour every `ReportRepository` backend must share.
//!
//! Each check gets a fresh repository from the factory so that backends are
//! exercised from an empty state.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use proxify_core::{
    Category, Location, ModerationError, ModerationEventKind, NewNotification, Notification,
    NotificationCategory, QuorumPolicy, Report, ReportId, ReportStatus, ReviewVote, UserId,
    VoteCommand, VoteOutcome, VoteTally,
};

use super::{ReportQuery, ReportRepository, RepositoryError};

pub(crate) fn pending_report(submitter: &str) -> Report {
    Report {
        id: ReportId::new(),
        submitter: UserId::from(submitter),
        description: "Power line down on Park Street".to_string(),
        category: Category::Alert,
        location: Location::new(22.5726, 88.3639),
        severity: 3,
        attachments: vec!["img-1".to_string(), "img-2".to_string()],
        status: ReportStatus::Pending,
        created_at: Utc::now(),
    }
}

fn vote(report: &Report, moderator: &str, approve: bool) -> VoteCommand {
    VoteCommand::new(report.id, moderator, approve)
}

pub(crate) async fn run_all<R, F, Fut>(factory: F)
where
    R: ReportRepository,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    report_round_trip(&factory().await).await;
    listing_filters_and_order(&factory().await).await;
    record_vote_is_unique(&factory().await).await;
    record_vote_requires_report(&factory().await).await;
    approval_scenario(&factory().await).await;
    rejection_scenario(&factory().await).await;
    duplicate_commit_leaves_tally(&factory().await).await;
    concurrent_same_moderator(&factory().await).await;
    transition_status_is_compare_and_set(&factory().await).await;
    submitter_stats_are_live(&factory().await).await;
    notifications_lifecycle(&factory().await).await;
    notifications_are_scoped_to_recipient(&factory().await).await;
}

async fn report_round_trip(repo: &impl ReportRepository) {
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    let loaded = repo.get_report(&report.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, report.id);
    assert_eq!(loaded.attachments, report.attachments);
    assert_eq!(loaded.location, report.location);
    assert_eq!(loaded.status, ReportStatus::Pending);

    assert!(repo.get_report(&ReportId::new()).await.unwrap().is_none());
}

async fn listing_filters_and_order(repo: &impl ReportRepository) {
    let base = Utc::now();
    let mut first = pending_report("alice");
    first.created_at = base - Duration::seconds(30);
    let mut second = pending_report("alice");
    second.created_at = base - Duration::seconds(20);
    let mut published = pending_report("bob");
    published.created_at = base - Duration::seconds(10);
    published.status = ReportStatus::Reviewed;

    for report in [&second, &published, &first] {
        repo.insert_report(report).await.unwrap();
    }

    let pending = repo
        .list_reports(&ReportQuery::awaiting_review())
        .await
        .unwrap();
    let ids: Vec<_> = pending.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let approved = repo.list_reports(&ReportQuery::published(10)).await.unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, published.id);

    let mine = repo
        .list_reports(&ReportQuery::by_submitter(UserId::from("alice"), None))
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);

    let mine_reviewed = repo
        .list_reports(&ReportQuery::by_submitter(
            UserId::from("alice"),
            Some(ReportStatus::Reviewed),
        ))
        .await
        .unwrap();
    assert!(mine_reviewed.is_empty());

    let limited = repo
        .list_reports(&ReportQuery {
            limit: Some(1),
            ..ReportQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, first.id);
}

async fn record_vote_is_unique(repo: &impl ReportRepository) {
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    let first = ReviewVote::new(report.id, UserId::from("mod-a"), true, Utc::now());
    repo.record_vote(&first).await.unwrap();

    let again = ReviewVote::new(report.id, UserId::from("mod-a"), false, Utc::now());
    assert_eq!(
        repo.record_vote(&again).await.unwrap_err(),
        RepositoryError::DuplicateVote
    );

    assert!(repo
        .has_voted(&report.id, &UserId::from("mod-a"))
        .await
        .unwrap());
    assert!(!repo
        .has_voted(&report.id, &UserId::from("mod-b"))
        .await
        .unwrap());
    assert_eq!(
        repo.count_votes(&report.id).await.unwrap(),
        VoteTally::new(1, 0)
    );

    let votes = repo.list_votes(&report.id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert!(votes[0].approve);
}

async fn record_vote_requires_report(repo: &impl ReportRepository) {
    let orphan = ReviewVote::new(ReportId::new(), UserId::from("mod-a"), true, Utc::now());
    assert_eq!(
        repo.record_vote(&orphan).await.unwrap_err(),
        RepositoryError::MissingReport
    );
}

async fn approval_scenario(repo: &impl ReportRepository) {
    let policy = QuorumPolicy::default();
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    let plan = repo
        .commit_vote(&vote(&report, "mod-a", true), &policy)
        .await
        .unwrap();
    assert_eq!(plan.outcome, VoteOutcome::Pending);
    assert_eq!(plan.tally, VoteTally::new(1, 0));

    let plan = repo
        .commit_vote(&vote(&report, "mod-b", true), &policy)
        .await
        .unwrap();
    assert_eq!(plan.outcome, VoteOutcome::Reviewed);
    assert_eq!(
        repo.count_votes(&report.id).await.unwrap(),
        VoteTally::new(2, 0)
    );

    let stored = repo.get_report(&report.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Reviewed);

    let notes = repo
        .list_notifications(&report.submitter, false)
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Alert Approved");
    assert!(!notes[0].read);

    for decision in [true, false] {
        let err = repo
            .commit_vote(&vote(&report, "mod-c", decision), &policy)
            .await
            .unwrap_err();
        assert_eq!(err, ModerationError::AlreadyFinalized);
    }

    assert_eq!(
        repo.count_votes(&report.id).await.unwrap(),
        VoteTally::new(2, 0)
    );
    assert_eq!(
        repo.list_notifications(&report.submitter, false)
            .await
            .unwrap()
            .len(),
        1
    );

    let kinds: Vec<_> = repo
        .list_events(&report.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ModerationEventKind::VoteRecorded,
            ModerationEventKind::VoteRecorded,
            ModerationEventKind::Approved,
        ]
    );
}

async fn rejection_scenario(repo: &impl ReportRepository) {
    let policy = QuorumPolicy::default();
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    for (moderator, expected) in [("mod-a", (0, 1)), ("mod-b", (0, 2))] {
        let plan = repo
            .commit_vote(&vote(&report, moderator, false), &policy)
            .await
            .unwrap();
        assert_eq!(plan.outcome, VoteOutcome::Pending);
        assert_eq!(plan.tally, VoteTally::new(expected.0, expected.1));
    }

    let plan = repo
        .commit_vote(&vote(&report, "mod-c", false), &policy)
        .await
        .unwrap();
    assert_eq!(plan.outcome, VoteOutcome::Deleted);
    assert_eq!(plan.tally, VoteTally::new(0, 3));

    assert!(repo.get_report(&report.id).await.unwrap().is_none());
    // Votes went with the report.
    assert_eq!(
        repo.count_votes(&report.id).await.unwrap(),
        VoteTally::default()
    );

    let notes = repo
        .list_notifications(&report.submitter, false)
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Alert Rejected");

    let err = repo
        .commit_vote(&vote(&report, "mod-d", true), &policy)
        .await
        .unwrap_err();
    assert_eq!(err, ModerationError::NotFound("report"));

    let deleted = repo
        .list_events(&report.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == ModerationEventKind::Deleted)
        .count();
    assert_eq!(deleted, 1);
}

async fn duplicate_commit_leaves_tally(repo: &impl ReportRepository) {
    let policy = QuorumPolicy::default();
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    repo.commit_vote(&vote(&report, "mod-a", false), &policy)
        .await
        .unwrap();
    let err = repo
        .commit_vote(&vote(&report, "mod-a", true), &policy)
        .await
        .unwrap_err();
    assert_eq!(err, ModerationError::DuplicateVote);
    assert_eq!(
        repo.count_votes(&report.id).await.unwrap(),
        VoteTally::new(0, 1)
    );
}

async fn concurrent_same_moderator(repo: &impl ReportRepository) {
    let policy = QuorumPolicy::default();
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    let first = vote(&report, "mod-a", true);
    let second = vote(&report, "mod-a", true);
    let (a, b) = tokio::join!(
        repo.commit_vote(&first, &policy),
        repo.commit_vote(&second, &policy)
    );

    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(ModerationError::DuplicateVote)))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, 1);
    assert_eq!(
        repo.count_votes(&report.id).await.unwrap(),
        VoteTally::new(1, 0)
    );
}

async fn transition_status_is_compare_and_set(repo: &impl ReportRepository) {
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    assert!(repo
        .transition_status(&report.id, ReportStatus::Pending, ReportStatus::AiReviewed)
        .await
        .unwrap());
    assert!(!repo
        .transition_status(&report.id, ReportStatus::Pending, ReportStatus::AiReviewed)
        .await
        .unwrap());
    assert!(!repo
        .transition_status(&ReportId::new(), ReportStatus::Pending, ReportStatus::AiReviewed)
        .await
        .unwrap());

    let stored = repo.get_report(&report.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::AiReviewed);
}

async fn submitter_stats_are_live(repo: &impl ReportRepository) {
    let policy = QuorumPolicy::default();
    let owner = UserId::from("owner");

    let stats = repo.submitter_stats(&owner).await.unwrap();
    assert_eq!(stats.total, 0);

    let to_approve = pending_report("owner");
    let to_reject = pending_report("owner");
    let untouched = pending_report("owner");
    let someone_else = pending_report("other");
    for report in [&to_approve, &to_reject, &untouched, &someone_else] {
        repo.insert_report(report).await.unwrap();
    }

    for moderator in ["m1", "m2"] {
        repo.commit_vote(&vote(&to_approve, moderator, true), &policy)
            .await
            .unwrap();
    }
    for moderator in ["m1", "m2", "m3"] {
        repo.commit_vote(&vote(&to_reject, moderator, false), &policy)
            .await
            .unwrap();
    }

    let stats = repo.submitter_stats(&owner).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.approved, 1);
    assert_eq!(stats.rejected, 1);
}

fn notification(recipient: &str, title: &str) -> Notification {
    NewNotification {
        recipient: UserId::from(recipient),
        title: title.to_string(),
        message: format!("{} body", title),
        category: NotificationCategory::System,
        payload: serde_json::json!({ "test_key": "test_value" }),
    }
    .into_notification(Utc::now())
}

async fn notifications_lifecycle(repo: &impl ReportRepository) {
    let user = UserId::from("user");
    let first = notification("user", "First");
    let second = notification("user", "Second");
    repo.insert_notification(&first).await.unwrap();
    repo.insert_notification(&second).await.unwrap();

    let all = repo.list_notifications(&user, false).await.unwrap();
    let titles: Vec<_> = all.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
    assert_eq!(all[0].payload["test_key"], "test_value");
    assert_eq!(repo.unread_count(&user).await.unwrap(), 2);

    assert!(repo.mark_notification_read(&user, &first.id).await.unwrap());
    let unread = repo.list_notifications(&user, true).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].title, "Second");

    assert_eq!(repo.mark_all_read(&user).await.unwrap(), 1);
    assert_eq!(repo.unread_count(&user).await.unwrap(), 0);

    assert!(repo.delete_notification(&user, &second.id).await.unwrap());
    assert!(!repo.delete_notification(&user, &second.id).await.unwrap());
    assert_eq!(repo.list_notifications(&user, false).await.unwrap().len(), 1);
}

async fn notifications_are_scoped_to_recipient(repo: &impl ReportRepository) {
    let admin_note = notification("admin", "For admin only");
    repo.insert_notification(&admin_note).await.unwrap();

    let intruder = UserId::from("user");
    assert!(!repo
        .mark_notification_read(&intruder, &admin_note.id)
        .await
        .unwrap());
    assert!(!repo
        .delete_notification(&intruder, &admin_note.id)
        .await
        .unwrap());
    assert_eq!(repo.mark_all_read(&intruder).await.unwrap(), 0);
    assert_eq!(
        repo.unread_count(&UserId::from("admin")).await.unwrap(),
        1
    );
}

// =============================================================================
// Racing and generated vote sequences
// =============================================================================

/// Two different moderators race the vote that reaches quorum, `rounds` times
/// per direction. Only meaningful on a multi-threaded runtime.
pub(crate) async fn run_quorum_races<R, F, Fut>(factory: F, rounds: usize)
where
    R: ReportRepository + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    for _ in 0..rounds {
        race_final_vote(Arc::new(factory().await), true).await;
        race_final_vote(Arc::new(factory().await), false).await;
    }
}

async fn race_final_vote<R: ReportRepository + 'static>(repo: Arc<R>, approve: bool) {
    let policy = QuorumPolicy::default();
    // Backends may be reopened on the same file between rounds.
    let report = pending_report(&format!("owner-{}", Uuid::new_v4()));
    repo.insert_report(&report).await.unwrap();

    let threshold = if approve {
        policy.approval_threshold
    } else {
        policy.rejection_threshold
    };
    for i in 1..threshold {
        let plan = repo
            .commit_vote(&vote(&report, &format!("mod-{}", i), approve), &policy)
            .await
            .unwrap();
        assert_eq!(plan.outcome, VoteOutcome::Pending);
    }

    let tasks: Vec<_> = ["mod-x", "mod-y"]
        .into_iter()
        .map(|moderator| {
            let repo = repo.clone();
            let command = vote(&report, moderator, approve);
            tokio::spawn(async move { repo.commit_vote(&command, &policy).await })
        })
        .collect();

    let (winning, losing, title, event) = if approve {
        (
            VoteOutcome::Reviewed,
            ModerationError::AlreadyFinalized,
            "Alert Approved",
            ModerationEventKind::Approved,
        )
    } else {
        (
            VoteOutcome::Deleted,
            ModerationError::NotFound("report"),
            "Alert Rejected",
            ModerationEventKind::Deleted,
        )
    };

    let mut wins = 0;
    let mut losses = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(plan) => {
                assert_eq!(plan.outcome, winning);
                wins += 1;
            }
            Err(err) => {
                assert_eq!(err, losing);
                losses += 1;
            }
        }
    }
    assert_eq!((wins, losses), (1, 1));

    let notes = repo
        .list_notifications(&report.submitter, false)
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, title);

    let terminal_events = repo
        .list_events(&report.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == event)
        .count();
    assert_eq!(terminal_events, 1);
}

/// Outcome a single accepted vote must produce, given the tally including it.
fn expected_outcome(tally: VoteTally, policy: &QuorumPolicy) -> VoteOutcome {
    if tally.rejections >= policy.rejection_threshold {
        VoteOutcome::Deleted
    } else if tally.approvals >= policy.approval_threshold {
        VoteOutcome::Reviewed
    } else {
        VoteOutcome::Pending
    }
}

fn check_terminal_notification(notes: &[Notification], terminal: Option<VoteOutcome>) {
    match terminal {
        Some(VoteOutcome::Reviewed) => {
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].title, "Alert Approved");
        }
        Some(VoteOutcome::Deleted) => {
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].title, "Alert Rejected");
        }
        _ => assert!(notes.is_empty(), "notified without a decision: {:?}", notes),
    }
}

/// Replays `(moderator index, approve)` votes one at a time and checks every
/// result against a direct model of the quorum rules.
pub(crate) async fn vote_sequence_matches_model(
    repo: &impl ReportRepository,
    policy: QuorumPolicy,
    votes: &[(u8, bool)],
) {
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    let mut voted = HashSet::new();
    let mut tally = VoteTally::default();
    let mut terminal: Option<VoteOutcome> = None;

    for (index, approve) in votes {
        let moderator = format!("mod-{}", index);
        let result = repo
            .commit_vote(&vote(&report, &moderator, *approve), &policy)
            .await;

        match terminal {
            Some(VoteOutcome::Deleted) => {
                assert_eq!(result.unwrap_err(), ModerationError::NotFound("report"))
            }
            Some(_) => assert_eq!(result.unwrap_err(), ModerationError::AlreadyFinalized),
            None if !voted.insert(moderator.clone()) => {
                assert_eq!(result.unwrap_err(), ModerationError::DuplicateVote)
            }
            None => {
                if *approve {
                    tally.approvals += 1;
                } else {
                    tally.rejections += 1;
                }
                let plan = result.unwrap();
                let expected = expected_outcome(tally, &policy);
                assert_eq!(plan.tally, tally);
                assert_eq!(plan.outcome, expected);
                if expected != VoteOutcome::Pending {
                    terminal = Some(expected);
                }
            }
        }
    }

    let stored = repo.get_report(&report.id).await.unwrap();
    match terminal {
        Some(VoteOutcome::Deleted) => assert!(stored.is_none()),
        Some(_) => {
            assert_eq!(stored.unwrap().status, ReportStatus::Reviewed);
            assert_eq!(repo.count_votes(&report.id).await.unwrap(), tally);
        }
        None => {
            assert_eq!(stored.unwrap().status, ReportStatus::Pending);
            assert_eq!(repo.count_votes(&report.id).await.unwrap(), tally);
        }
    }

    let notes = repo
        .list_notifications(&report.submitter, false)
        .await
        .unwrap();
    check_terminal_notification(&notes, terminal);
}

/// Issues one vote per decision, each from a different moderator, all at
/// once. Whatever order the store serializes them in, accepted votes see
/// strictly increasing tallies and at most one of them finalizes.
pub(crate) async fn concurrent_votes_serialize<R: ReportRepository + 'static>(
    repo: Arc<R>,
    policy: QuorumPolicy,
    decisions: &[bool],
) {
    let report = pending_report("owner");
    repo.insert_report(&report).await.unwrap();

    let tasks: Vec<_> = decisions
        .iter()
        .enumerate()
        .map(|(i, approve)| {
            let repo = repo.clone();
            let command = vote(&report, &format!("mod-{}", i), *approve);
            tokio::spawn(async move { repo.commit_vote(&command, &policy).await })
        })
        .collect();

    let mut plans = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(plan) => plans.push(plan),
            Err(ModerationError::AlreadyFinalized) | Err(ModerationError::NotFound(_)) => {}
            Err(other) => panic!("unexpected vote error: {}", other),
        }
    }

    plans.sort_by_key(|plan| plan.tally.total());
    let totals: Vec<u32> = plans.iter().map(|plan| plan.tally.total()).collect();
    let expected_totals: Vec<u32> = (1..=plans.len() as u32).collect();
    assert_eq!(totals, expected_totals);

    for plan in &plans {
        assert_eq!(plan.outcome, expected_outcome(plan.tally, &policy));
    }

    let terminal: Vec<VoteOutcome> = plans
        .iter()
        .map(|plan| plan.outcome)
        .filter(|outcome| *outcome != VoteOutcome::Pending)
        .collect();
    assert!(terminal.len() <= 1, "finalized more than once: {:?}", terminal);
    if let Some(outcome) = terminal.first() {
        let last = plans.last().map(|plan| plan.outcome);
        assert_eq!(last, Some(*outcome), "a vote was accepted after the decision");
    }

    let notes = repo
        .list_notifications(&report.submitter, false)
        .await
        .unwrap();
    check_terminal_notification(&notes, terminal.first().copied());
}
