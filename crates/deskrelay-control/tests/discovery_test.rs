//! Discovery reconciliation tests

mod common;

use common::{harness, ready_banner, running_report};
use deskrelay_control::ControlError;
use deskrelay_ports::PortBand;
use deskrelay_proto::{SessionRecord, SessionReport};

#[tokio::test]
async fn discover_adopts_only_running_sessions_with_marker() {
    let h = harness();
    h.runtime.push_list(vec![
        running_report("ready", 5901),
        SessionReport {
            id: "booting".to_string(),
            is_running: true,
            captured_output: "Xvfb starting\n".to_string(),
        },
        SessionReport {
            id: "exited".to_string(),
            is_running: false,
            captured_output: ready_banner(5903),
        },
    ]);

    let outcome = h.manager.discover().await.unwrap();

    assert_eq!(outcome.sessions.len(), 1);
    assert_eq!(outcome.sessions[0].id, "ready");
    assert!(outcome.conflicts.is_empty());

    assert!(h.registry.contains("ready"));
    assert!(!h.registry.contains("booting"));
    assert!(!h.registry.contains("exited"));
    assert!(h.allocator.is_reserved(PortBand::Vnc, 5901));
}

#[tokio::test]
async fn discover_adopts_on_next_pass_once_marker_appears() {
    let h = harness();
    h.runtime.push_list(vec![SessionReport {
        id: "slow".to_string(),
        is_running: true,
        captured_output: String::new(),
    }]);
    h.runtime.push_list(vec![running_report("slow", 5901)]);

    let first = h.manager.discover().await.unwrap();
    assert!(first.sessions.is_empty());
    assert!(!h.registry.contains("slow"));

    let second = h.manager.discover().await.unwrap();
    assert_eq!(second.sessions.len(), 1);
    assert_eq!(h.registry.count(), 1);
    assert!(h.registry.get("slow").unwrap().is_running());
}

#[tokio::test]
async fn discover_drops_sessions_no_longer_reported() {
    let h = harness();
    h.registry
        .insert(SessionRecord::discovered("stale".to_string(), 5900));
    h.allocator.reserve(PortBand::Vnc, 5900).unwrap();

    h.runtime.push_list(vec![running_report("fresh", 5901)]);

    let outcome = h.manager.discover().await.unwrap();

    assert!(!h.registry.contains("stale"));
    assert!(h.registry.contains("fresh"));
    assert!(!h.allocator.is_reserved(PortBand::Vnc, 5900));
    assert!(h.allocator.is_reserved(PortBand::Vnc, 5901));
    assert_eq!(outcome.sessions.len(), 1);
}

#[tokio::test]
async fn discover_never_clobbers_provisional_records() {
    let h = harness();
    h.registry.insert(SessionRecord::starting(
        "launching".to_string(),
        5900,
        9222,
        99,
    ));

    h.runtime.push_list(vec![running_report("other", 5901)]);
    h.manager.discover().await.unwrap();

    let record = h.registry.get("launching").unwrap();
    assert!(record.is_provisional());
    assert!(h.registry.contains("other"));
}

#[tokio::test]
async fn discover_surfaces_port_conflicts() {
    let h = harness();
    // a port reserved by an in-flight create, not yet confirmed
    h.allocator.reserve(PortBand::Vnc, 5902).unwrap();

    h.runtime.push_list(vec![running_report("collider", 5902)]);

    let outcome = h.manager.discover().await.unwrap();

    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.conflicts[0].id, "collider");
    assert_eq!(outcome.conflicts[0].port, 5902);
    assert!(
        !h.registry.contains("collider"),
        "a conflicting session must not be adopted"
    );
    assert!(h.allocator.is_reserved(PortBand::Vnc, 5902));
}

#[tokio::test]
async fn discover_keeps_tracked_sessions_and_their_ports() {
    let h = harness();
    h.registry
        .insert(SessionRecord::discovered("keep".to_string(), 5900));
    h.allocator.reserve(PortBand::Vnc, 5900).unwrap();

    h.runtime.push_list(vec![running_report("keep", 5900)]);

    let outcome = h.manager.discover().await.unwrap();

    assert_eq!(outcome.sessions.len(), 1);
    assert!(outcome.conflicts.is_empty(), "own reservation is no conflict");
    assert!(h.registry.contains("keep"));
    assert!(h.allocator.is_reserved(PortBand::Vnc, 5900));
}

#[tokio::test]
async fn discover_query_failure_is_fail_soft() {
    let h = harness();
    h.registry
        .insert(SessionRecord::discovered("alive".to_string(), 5900));
    h.allocator.reserve(PortBand::Vnc, 5900).unwrap();
    h.runtime.set_fail_list(true);

    let err = h.manager.discover().await.unwrap_err();

    assert!(matches!(err, ControlError::Runtime(_)));
    assert!(h.registry.contains("alive"));
    assert!(h.allocator.is_reserved(PortBand::Vnc, 5900));
}
