use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use oplog_protocol::*;
use oplog_state::*;

fn op(id: i64, flow: &str, status: OperationStatus, kind: OperationKind) -> OperationRecord {
    let mut op = OperationRecord::new(id, flow, kind);
    op.instance_id = "A".into();
    op.plan_id = "p1".into();
    op.repo_id = "repo1".into();
    op.status = status;
    op.start_time = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap() + chrono::Duration::minutes(id);
    op
}

fn backup(id: i64, flow: &str, status: OperationStatus) -> OperationRecord {
    op(id, flow, status, OperationKind::Backup { last_status: None })
}

fn hook(id: i64, flow: &str, status: OperationStatus) -> OperationRecord {
    op(
        id,
        flow,
        status,
        OperationKind::RunHook { name: "notify".into(), condition: "on_error".into(), parent_op: None },
    )
}

fn recording(agg: &mut FlowAggregator) -> Arc<Mutex<Vec<OperationChange>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    agg.subscribe(move |change| sink.lock().unwrap().push(change.clone()));
    seen
}

#[test]
fn test_single_create_notifies_listener() {
    let mut agg = FlowAggregator::default();
    let seen = recording(&mut agg);

    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));

    let ops = agg.get_by_flow_id(&FlowId::from("f1"));
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].id, OperationId(1));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0],
        OperationChange {
            ids: vec![OperationId(1)],
            flow_ids: vec![FlowId::from("f1")],
            kind: EventKind::Created,
        }
    );
}

#[test]
fn test_error_wins_over_success() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![
        backup(1, "f1", OperationStatus::Success),
        op(2, "f1", OperationStatus::Error, OperationKind::Forget),
    ]));
    let info = agg.flow(&FlowId::from("f1")).unwrap();
    assert_eq!(info.status, OperationStatus::Error);
    assert_eq!(info.operations.len(), 2);
}

#[test]
fn test_warning_beats_in_progress() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![
        backup(1, "f1", OperationStatus::InProgress),
        hook(2, "f1", OperationStatus::Warning),
    ]));
    assert_eq!(agg.flow(&FlowId::from("f1")).unwrap().status, OperationStatus::Warning);
}

#[test]
fn test_ingest_is_idempotent() {
    let batch = vec![
        backup(1, "f1", OperationStatus::Success),
        backup(2, "f2", OperationStatus::Error),
    ];
    let mut once = FlowAggregator::default();
    once.ingest(OperationEvent::Created(batch.clone()));

    let mut twice = FlowAggregator::default();
    let seen = recording(&mut twice);
    twice.ingest(OperationEvent::Created(batch.clone()));
    let replay = twice.ingest(OperationEvent::Created(batch));

    assert!(replay.is_none(), "replaying known content must not report a change");
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(once.flows(), twice.flows());
}

#[test]
fn test_flow_does_not_depend_on_ingest_order() {
    let a = backup(1, "f1", OperationStatus::Success);
    let b = op(2, "f1", OperationStatus::Warning, OperationKind::Check { output: String::new() });
    let c = hook(3, "f1", OperationStatus::Error);

    let mut forward = FlowAggregator::default();
    forward.ingest(OperationEvent::Created(vec![a.clone(), b.clone(), c.clone()]));

    let mut backward = FlowAggregator::default();
    backward.ingest(OperationEvent::Created(vec![c]));
    backward.ingest(OperationEvent::Updated(vec![b]));
    backward.ingest(OperationEvent::Created(vec![a]));

    let content = |agg: &FlowAggregator| {
        let mut info = (*agg.flow(&FlowId::from("f1")).unwrap()).clone();
        info.revision = 0;
        info
    };
    assert_eq!(content(&forward), content(&backward));
}

#[test]
fn test_revision_bumps_only_on_change() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));
    agg.ingest(OperationEvent::Created(vec![backup(2, "f2", OperationStatus::Success)]));
    let first = agg.flow(&FlowId::from("f1")).unwrap().revision;
    assert!(first > 0);

    // Replays and changes to other flows leave the revision alone.
    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));
    agg.ingest(OperationEvent::Updated(vec![backup(2, "f2", OperationStatus::Error)]));
    assert_eq!(agg.flow(&FlowId::from("f1")).unwrap().revision, first);

    agg.ingest(OperationEvent::Updated(vec![backup(1, "f1", OperationStatus::Warning)]));
    assert!(agg.flow(&FlowId::from("f1")).unwrap().revision > first);
}

#[test]
fn test_deleting_sole_operation_removes_flow() {
    let mut agg = FlowAggregator::default();
    let seen = recording(&mut agg);
    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));
    agg.ingest(OperationEvent::Deleted(vec![OperationId(1)]));

    assert!(agg.get_by_flow_id(&FlowId::from("f1")).is_empty());
    assert!(agg.flow(&FlowId::from("f1")).is_none());
    assert!(agg.is_empty());

    let seen = seen.lock().unwrap();
    assert_eq!(seen[1].kind, EventKind::Deleted);
    assert_eq!(seen[1].flow_ids, vec![FlowId::from("f1")]);
}

#[test]
fn test_deleting_one_of_many_recomputes_flow() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![
        backup(1, "f1", OperationStatus::Success),
        op(2, "f1", OperationStatus::Error, OperationKind::Forget),
    ]));
    agg.ingest(OperationEvent::Deleted(vec![OperationId(2)]));

    let info = agg.flow(&FlowId::from("f1")).unwrap();
    assert_eq!(info.status, OperationStatus::Success);
    assert_eq!(info.operations.len(), 1);
}

#[test]
fn test_unknown_delete_is_a_no_op() {
    let mut agg = FlowAggregator::default();
    let seen = recording(&mut agg);
    assert!(agg.ingest(OperationEvent::Deleted(vec![OperationId(42)])).is_none());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_orphaned_hook_flow_is_hidden() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![hook(5, "f-hook", OperationStatus::Error)]));

    assert!(agg.flow(&FlowId::from("f-hook")).is_none());
    assert!(agg.flows().is_empty());
    // still tracked for point lookups
    assert_eq!(agg.get_by_flow_id(&FlowId::from("f-hook")).len(), 1);
}

#[test]
fn test_hook_after_parent_is_shown() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![
        backup(1, "f1", OperationStatus::Error),
        hook(2, "f1", OperationStatus::Error),
    ]));
    let info = agg.flow(&FlowId::from("f1")).unwrap();
    assert_eq!(info.display_type, DisplayType::Backup);
    assert!(!info.hidden);
}

#[test]
fn test_flow_hidden_once_parent_deleted() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![
        backup(1, "f1", OperationStatus::Error),
        hook(2, "f1", OperationStatus::Error),
    ]));
    agg.ingest(OperationEvent::Deleted(vec![OperationId(1)]));
    assert!(agg.flow(&FlowId::from("f1")).is_none());
}

#[test]
fn test_forgotten_snapshot_hides_flow() {
    let mut agg = FlowAggregator::default();
    let snapshot = op(
        2,
        "f1",
        OperationStatus::Success,
        OperationKind::IndexSnapshot {
            snapshot: Some(SnapshotInfo { id: "abcdef0123456789".into(), summary: None }),
            forgot: false,
        },
    );
    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success), snapshot.clone()]));
    assert_eq!(
        agg.flow(&FlowId::from("f1")).unwrap().snapshot_id.as_deref(),
        Some("abcdef0123456789")
    );

    let mut forgotten = snapshot;
    forgotten.modno = 1;
    forgotten.op = OperationKind::IndexSnapshot {
        snapshot: Some(SnapshotInfo { id: "abcdef0123456789".into(), summary: None }),
        forgot: true,
    };
    agg.ingest(OperationEvent::Updated(vec![forgotten]));
    assert!(agg.flow(&FlowId::from("f1")).is_none());
}

#[test]
fn test_missing_flow_id_is_dropped() {
    let mut agg = FlowAggregator::default();
    let malformed = backup(1, "", OperationStatus::Success);
    assert!(agg.ingest(OperationEvent::Created(vec![malformed])).is_none());
    assert_eq!(agg.operation_count(), 0);
}

#[test]
fn test_stale_revision_is_ignored() {
    let mut agg = FlowAggregator::default();
    let mut fresh = backup(1, "f1", OperationStatus::Success);
    fresh.modno = 5;
    let mut stale = backup(1, "f1", OperationStatus::InProgress);
    stale.modno = 3;

    agg.ingest(OperationEvent::Updated(vec![fresh]));
    assert!(agg.ingest(OperationEvent::Updated(vec![stale])).is_none());
    assert_eq!(agg.flow(&FlowId::from("f1")).unwrap().status, OperationStatus::Success);
}

#[test]
fn test_update_moves_operation_between_flows() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));

    let mut moved = backup(1, "f2", OperationStatus::Success);
    moved.modno = 1;
    let change = agg.ingest(OperationEvent::Updated(vec![moved])).unwrap();

    assert_eq!(change.flow_ids, vec![FlowId::from("f1"), FlowId::from("f2")]);
    assert!(agg.flow(&FlowId::from("f1")).is_none());
    assert!(agg.flow(&FlowId::from("f2")).is_some());
}

#[test]
fn test_filter_excludes_operations() {
    let mut agg = FlowAggregator::new(|op| !matches!(op.op, OperationKind::Forget));
    agg.ingest(OperationEvent::Created(vec![op(1, "f1", OperationStatus::Success, OperationKind::Forget)]));
    assert!(agg.is_empty());
    assert!(agg.get_by_flow_id(&FlowId::from("f1")).is_empty());
}

#[test]
fn test_update_that_fails_filter_untracks_operation() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![
        backup(1, "f1", OperationStatus::Success),
        hook(2, "f1", OperationStatus::InProgress),
    ]));
    assert_eq!(agg.get_by_flow_id(&FlowId::from("f1")).len(), 2);

    // successful hooks are hidden by the default filter
    let mut done = hook(2, "f1", OperationStatus::Success);
    done.modno = 1;
    let change = agg.ingest(OperationEvent::Updated(vec![done])).unwrap();
    assert_eq!(change.ids, vec![OperationId(2)]);
    assert_eq!(agg.get_by_flow_id(&FlowId::from("f1")).len(), 1);
}

#[test]
fn test_every_listener_receives_every_change() {
    let mut agg = FlowAggregator::default();
    let first = recording(&mut agg);
    let second = recording(&mut agg);
    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));
    agg.ingest(OperationEvent::Created(vec![backup(2, "f2", OperationStatus::Success)]));
    assert_eq!(first.lock().unwrap().len(), 2);
    assert_eq!(*first.lock().unwrap(), *second.lock().unwrap());
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let mut agg = FlowAggregator::default();
    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    let sub = agg.subscribe(move |_| *sink.lock().unwrap() += 1);

    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));
    assert!(agg.unsubscribe(sub));
    assert!(!agg.unsubscribe(sub));
    agg.ingest(OperationEvent::Created(vec![backup(2, "f2", OperationStatus::Success)]));
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_listener_count_tracks_subscriptions() {
    let mut agg = FlowAggregator::default();
    let a = agg.subscribe(|_| {});
    agg.subscribe(|_| {});
    assert_eq!(agg.listener_count(), 2);
    agg.unsubscribe(a);
    assert_eq!(agg.listener_count(), 1);
}

#[test]
fn test_dispose_clears_state() {
    let mut agg = FlowAggregator::default();
    let seen = recording(&mut agg);
    agg.ingest(OperationEvent::Created(vec![backup(1, "f1", OperationStatus::Success)]));
    agg.dispose();
    assert!(agg.is_empty());
    assert_eq!(agg.operation_count(), 0);
    agg.ingest(OperationEvent::Created(vec![backup(2, "f2", OperationStatus::Success)]));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_flows_snapshot_sorted_by_flow_id() {
    let mut agg = FlowAggregator::default();
    agg.ingest(OperationEvent::Created(vec![
        backup(1, "f3", OperationStatus::Success),
        backup(2, "f1", OperationStatus::Success),
        backup(3, "f2", OperationStatus::Success),
    ]));
    let ids: Vec<_> = agg.flows().iter().map(|f| f.flow_id.to_string()).collect();
    assert_eq!(ids, vec!["f1", "f2", "f3"]);
}
