//! Contract Test: Change Cycle
//!
//! Verifies what a single cycle does for each combination of stored IP,
//! resolved IP and DNS outcome.
//!
//! Constraints verified:
//! - An empty history makes the first resolved IP a change
//! - An unchanged IP touches neither DNS, notifiers nor history
//! - Notifications are attempted if and only if the DNS outcome is Success
//! - A changed cycle appends exactly one entry whatever the notifiers do
//! - Email is dispatched before push

mod common;

use common::*;
use wanwatch_core::traits::{Channel, DnsUpdateOutcome, HistoryEntry, HistoryStore, IpSnapshot, LocationInfo, OutcomeKind};
use wanwatch_core::{LoopEvent, MemoryHistoryStore};

fn seeded_store(address: &str) -> MemoryHistoryStore {
    let snapshot = IpSnapshot::observed_at(
        ip(address),
        "2025-01-09T12:00:00Z".parse().unwrap(),
        LocationInfo::unknown(),
    );
    MemoryHistoryStore::with_entries(vec![HistoryEntry::new(
        &snapshot,
        &DnsUpdateOutcome::Success,
    )])
}

#[tokio::test]
async fn first_run_with_success_records_and_notifies_once() {
    let harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    let (change_loop, _events, store) = harness.build_in_memory();

    let result = change_loop.run_cycle(&stub_settings(60)).await;

    assert!(result.ip_changed, "empty history must count as a change");
    assert_eq!(result.dns_outcome, Some(DnsUpdateOutcome::Success));
    assert_eq!(harness.dns.targets(), vec![ip("203.0.113.5")]);
    assert_eq!(harness.email.call_count(), 1);
    assert_eq!(harness.push.call_count(), 1);
    assert_eq!(
        result.notifications_sent.into_iter().collect::<Vec<_>>(),
        vec![Channel::Email, Channel::Push]
    );

    let entries = store.load().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ip, ip("203.0.113.5"));
    assert_eq!(entries[0].dns_outcome, OutcomeKind::Success);
    assert_eq!(entries[0].location.city(), "Lisbon");
    assert_eq!(entries[0].previous_ip, None);
    assert_eq!(entries[0].platform.as_deref(), Some("Linux"));
}

#[tokio::test]
async fn unchanged_ip_does_nothing() {
    let harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    let store = seeded_store("203.0.113.5");
    let (change_loop, _events) = harness.build(store.clone());

    let result = change_loop.run_cycle(&stub_settings(60)).await;

    assert!(!result.ip_changed);
    assert_eq!(result.ip, Some(ip("203.0.113.5")));
    assert_eq!(result.dns_outcome, None);
    assert_eq!(harness.dns.call_count(), 0);
    assert_eq!(harness.geo.call_count(), 0);
    assert_eq!(harness.notification_count(), 0);
    assert_eq!(store.len().await, 1, "no new history entry");
    assert!(change_loop.last_checked().await.is_some());
}

#[tokio::test]
async fn failed_dns_records_failure_without_notifying() {
    let harness = Harness::new(
        ip("198.51.100.7"),
        DnsUpdateOutcome::failed("zone/record not found"),
    );
    let store = seeded_store("203.0.113.5");
    let (change_loop, _events) = harness.build(store.clone());

    let result = change_loop.run_cycle(&stub_settings(60)).await;

    assert!(result.ip_changed);
    assert_eq!(harness.notification_count(), 0);
    assert!(result.notifications_sent.is_empty());

    let entries = store.load().await.unwrap();
    assert_eq!(entries.len(), 2);
    let last = &entries[1];
    assert_eq!(last.ip, ip("198.51.100.7"));
    assert_eq!(last.dns_outcome, OutcomeKind::Failed);
    assert_eq!(last.dns_error.as_deref(), Some("zone/record not found"));
    assert_eq!(last.previous_ip, Some(ip("203.0.113.5")));
}

#[tokio::test]
async fn notifications_are_gated_on_dns_success() {
    let outcomes = [
        (DnsUpdateOutcome::Success, 2),
        (DnsUpdateOutcome::Skipped, 0),
        (DnsUpdateOutcome::failed("401 Unauthorized"), 0),
        (DnsUpdateOutcome::failed("timeout"), 0),
    ];

    for (outcome, expected_notifications) in outcomes {
        let harness = Harness::new(ip("203.0.113.9"), outcome.clone());
        let (change_loop, _events, store) = harness.build_in_memory();

        change_loop.run_cycle(&stub_settings(60)).await;

        assert_eq!(
            harness.notification_count(),
            expected_notifications,
            "outcome {outcome} should produce {expected_notifications} notifications"
        );
        let entries = store.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dns_outcome, outcome.kind());
    }
}

#[tokio::test]
async fn history_is_appended_when_every_notifier_fails() {
    let harness =
        Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success).failing_notifiers();
    let (change_loop, _events, store) = harness.build_in_memory();

    let result = change_loop.run_cycle(&stub_settings(60)).await;

    // Both were attempted even though the first failed
    assert_eq!(harness.email.call_count(), 1);
    assert_eq!(harness.push.call_count(), 1);
    assert!(result.notifications_sent.is_empty());
    assert_eq!(result.errors.len(), 2);

    let entries = store.load().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].dns_outcome, OutcomeKind::Success);
}

#[tokio::test]
async fn email_is_dispatched_before_push() {
    let harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    let (change_loop, _events, _store) = harness.build_in_memory();

    change_loop.run_cycle(&stub_settings(60)).await;

    assert_eq!(harness.dispatch_order(), vec![Channel::Email, Channel::Push]);
}

#[tokio::test]
async fn notice_carries_previous_ip_and_elapsed_time() {
    let harness = Harness::new(ip("198.51.100.7"), DnsUpdateOutcome::Success);
    let (change_loop, _events) = harness.build(seeded_store("203.0.113.5"));

    change_loop.run_cycle(&stub_settings(60)).await;

    let notices = harness.email.notices();
    assert_eq!(notices.len(), 1);
    let notice = &notices[0];
    assert_eq!(notice.ip, ip("198.51.100.7"));
    assert_eq!(notice.previous_ip_label(), "203.0.113.5");
    assert_eq!(notice.platform, "Linux");
    assert!(notice.since_previous.is_some());
    assert_ne!(notice.elapsed_label(), "N/A");
}

#[tokio::test]
async fn geolocation_failure_uses_placeholder() {
    let mut harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    harness.geo = StubGeo::failing();
    let (change_loop, _events, store) = harness.build_in_memory();

    let result = change_loop.run_cycle(&stub_settings(60)).await;

    assert_eq!(result.dns_outcome, Some(DnsUpdateOutcome::Success));
    assert_eq!(harness.notification_count(), 2);
    let entries = store.load().await.unwrap();
    assert!(entries[0].location.is_unknown());
    assert_eq!(harness.email.notices()[0].location.city(), "Unknown");
}

#[tokio::test]
async fn resolution_failure_ends_cycle_without_recording() {
    let mut harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    harness.resolver = SharedResolver::failing();
    let (change_loop, mut events, store) = harness.build_in_memory();

    let result = change_loop.run_cycle(&stub_settings(60)).await;

    assert!(!result.ip_changed);
    assert_eq!(result.ip, None);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(harness.dns.call_count(), 0);
    assert!(store.is_empty().await);
    assert!(change_loop.last_checked().await.is_none());
    assert!(
        drain(&mut events)
            .iter()
            .any(|e| matches!(e, LoopEvent::CycleFailed { .. }))
    );
}

#[tokio::test]
async fn unknown_notify_backend_still_records() {
    let harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    let (change_loop, _events, store) = harness.build_in_memory();

    let mut settings = stub_settings(60);
    settings.notify.backend = "carrier-pigeon".to_string();
    let result = change_loop.run_cycle(&settings).await;

    assert_eq!(harness.notification_count(), 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn none_backend_sends_nothing() {
    let harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    let (change_loop, _events, store) = harness.build_in_memory();

    let mut settings = stub_settings(60);
    settings.notify.backend = "none".to_string();
    let result = change_loop.run_cycle(&settings).await;

    assert!(result.errors.is_empty());
    assert_eq!(harness.notification_count(), 0);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn changed_cycle_emits_events_in_order() {
    let harness = Harness::new(ip("203.0.113.5"), DnsUpdateOutcome::Success);
    let (change_loop, mut events, _store) = harness.build_in_memory();

    change_loop.run_cycle(&stub_settings(60)).await;

    let events = drain(&mut events);
    assert_eq!(
        events,
        vec![
            LoopEvent::CycleStarted,
            LoopEvent::AddressResolved { ip: ip("203.0.113.5") },
            LoopEvent::AddressChanged {
                ip: ip("203.0.113.5"),
                previous_ip: None
            },
            LoopEvent::DnsUpdated {
                ip: ip("203.0.113.5"),
                outcome: DnsUpdateOutcome::Success
            },
            LoopEvent::NotificationSent { channel: Channel::Email },
            LoopEvent::NotificationSent { channel: Channel::Push },
            LoopEvent::HistoryRecorded {
                ip: ip("203.0.113.5"),
                outcome: OutcomeKind::Success
            },
        ]
    );
}
