//! Tests for the in-memory propagation store.
//!
//! Tests cover:
//! - Root creation and candidate ids
//! - Node insertion, depth derivation and summary maintenance
//! - Rejected inserts (unknown root, unknown parent, duplicates)
//! - Children, frontier and path projections
//! - Engagement flags
//! - Summary rebuild and audit

use cascade_core::cascade::{ContentRef, EngagementAction, NodeId, RootId, ShareRoot, UserId};
use cascade_core::error::ErrorCode;
use cascade_core::store::{MemoryStore, PropagationStore};

fn seeded() -> (MemoryStore, ShareRoot) {
    let store = MemoryStore::new();
    let root = store
        .create_root(None, "alice".into(), ContentRef::new("track-42"))
        .unwrap();
    (store, root)
}

// ============================================================================
// Roots
// ============================================================================

#[test]
fn test_create_root_with_candidate_id() {
    let store = MemoryStore::new();
    let wanted = RootId::new();
    let root = store
        .create_root(Some(wanted), "alice".into(), "track".into())
        .unwrap();

    assert_eq!(root.id, wanted);
    assert_eq!(store.get_root(wanted).unwrap(), root);
}

#[test]
fn test_same_content_shared_twice_gives_two_roots() {
    let store = MemoryStore::new();
    let first = store.create_root(None, "alice".into(), "track".into()).unwrap();
    let second = store.create_root(None, "alice".into(), "track".into()).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_parentless_insert_on_existing_root() {
    let (store, root) = seeded();
    let err = store.insert_node(root.id, "bob".into(), None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateRoot);
    assert_eq!(store.get_summary(root.id).unwrap().total_reach, 1);
}

// ============================================================================
// Inserts
// ============================================================================

#[test]
fn test_chain_depths_and_summary() {
    let (store, root) = seeded();
    let bob = store
        .insert_node(root.id, "bob".into(), Some(root.root_node_id))
        .unwrap();
    let carol = store.insert_node(root.id, "carol".into(), Some(bob.id)).unwrap();
    let dave = store.insert_node(root.id, "dave".into(), Some(carol.id)).unwrap();

    assert_eq!(bob.depth, 1);
    assert_eq!(carol.depth, 2);
    assert_eq!(dave.depth, 3);
    assert_eq!(dave.parent_id, Some(carol.id));

    let summary = store.get_summary(root.id).unwrap();
    assert_eq!(summary.total_reach, 4);
    assert_eq!(summary.max_depth, 3);
}

#[test]
fn test_wide_fanout_keeps_depth_one() {
    let (store, root) = seeded();
    for i in 0..50 {
        store
            .insert_node(root.id, UserId::new(format!("user-{i}")), Some(root.root_node_id))
            .unwrap();
    }

    let summary = store.get_summary(root.id).unwrap();
    assert_eq!(summary.total_reach, 51);
    assert_eq!(summary.max_depth, 1);
    assert_eq!(store.list_children(root.id, root.root_node_id).unwrap().len(), 50);
}

#[test]
fn test_insert_under_unknown_parent() {
    let (store, root) = seeded();
    let err = store
        .insert_node(root.id, "bob".into(), Some(NodeId::new()))
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ParentNotFound);
    assert_eq!(store.get_summary(root.id).unwrap().total_reach, 1);
    assert_eq!(store.list_nodes(root.id).unwrap().len(), 1);
}

#[test]
fn test_insert_with_parent_from_another_root() {
    let (store, root) = seeded();
    let other = store.create_root(None, "zoe".into(), "track".into()).unwrap();

    let err = store
        .insert_node(root.id, "bob".into(), Some(other.root_node_id))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ParentNotFound);
}

#[test]
fn test_second_insert_for_same_user() {
    let (store, root) = seeded();
    let bob = store
        .insert_node(root.id, "bob".into(), Some(root.root_node_id))
        .unwrap();
    let carol = store.insert_node(root.id, "carol".into(), Some(bob.id)).unwrap();

    let err = store
        .insert_node(root.id, "bob".into(), Some(carol.id))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateParticipant);
    assert_eq!(err.details().context["existing_node_id"], serde_json::json!(bob.id));

    // The origin user is a participant too.
    let err = store
        .insert_node(root.id, "alice".into(), Some(bob.id))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateParticipant);

    assert_eq!(store.get_summary(root.id).unwrap().total_reach, 3);
}

#[test]
fn test_user_may_join_several_roots() {
    let store = MemoryStore::new();
    let a = store.create_root(None, "alice".into(), "t1".into()).unwrap();
    let b = store.create_root(None, "zoe".into(), "t2".into()).unwrap();

    store.insert_node(a.id, "bob".into(), Some(a.root_node_id)).unwrap();
    store.insert_node(b.id, "bob".into(), Some(b.root_node_id)).unwrap();

    assert!(store.find_participant(a.id, &"bob".into()).unwrap().is_some());
    assert!(store.find_participant(b.id, &"bob".into()).unwrap().is_some());
}

// ============================================================================
// Projections
// ============================================================================

#[test]
fn test_frontier_and_path() {
    let (store, root) = seeded();
    let bob = store
        .insert_node(root.id, "bob".into(), Some(root.root_node_id))
        .unwrap();
    let carol = store.insert_node(root.id, "carol".into(), Some(bob.id)).unwrap();
    let erin = store
        .insert_node(root.id, "erin".into(), Some(root.root_node_id))
        .unwrap();

    let mut frontier: Vec<NodeId> = store
        .frontier(root.id)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    frontier.sort();
    let mut expected = vec![carol.id, erin.id];
    expected.sort();
    assert_eq!(frontier, expected);

    let path: Vec<NodeId> = store
        .path_to(root.id, &"carol".into())
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(path, vec![root.root_node_id, bob.id, carol.id]);

    assert!(store.path_to(root.id, &"nobody".into()).unwrap().is_none());
}

#[test]
fn test_children_of_unknown_node() {
    let (store, root) = seeded();
    let err = store.list_children(root.id, NodeId::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NodeNotFound);
}

#[test]
fn test_cascade_record_ordered_by_depth() {
    let (store, root) = seeded();
    let bob = store
        .insert_node(root.id, "bob".into(), Some(root.root_node_id))
        .unwrap();
    store.insert_node(root.id, "carol".into(), Some(bob.id)).unwrap();

    let record = store.cascade(root.id).unwrap();
    let depths: Vec<u32> = record.nodes.iter().map(|n| n.depth).collect();
    assert_eq!(depths, vec![0, 1, 2]);
    assert_eq!(record.summary.total_reach, 3);
    assert_eq!(record.root, root);
}

// ============================================================================
// Engagement
// ============================================================================

#[test]
fn test_flags_do_not_change_summary() {
    let (store, root) = seeded();
    store
        .insert_node(root.id, "bob".into(), Some(root.root_node_id))
        .unwrap();
    let before = store.get_summary(root.id).unwrap();

    let bob = store
        .set_flag(root.id, &"bob".into(), EngagementAction::Played)
        .unwrap();
    let bob = store
        .set_flag(root.id, &bob.acting_user, EngagementAction::Dismissed)
        .unwrap();

    assert!(bob.flags.played);
    assert!(bob.flags.dismissed);
    assert!(!bob.flags.saved);

    let after = store.get_summary(root.id).unwrap();
    assert!(before.same_aggregates(&after));
}

#[test]
fn test_forward_marks_parent() {
    let (store, root) = seeded();
    store
        .insert_node(root.id, "bob".into(), Some(root.root_node_id))
        .unwrap();

    let alice = store.get_node(root.id, root.root_node_id).unwrap();
    assert!(alice.flags.forwarded);
}

#[test]
fn test_flag_for_stranger() {
    let (store, root) = seeded();
    let err = store
        .set_flag(root.id, &"nobody".into(), EngagementAction::Saved)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NodeNotFound);
}

// ============================================================================
// Rebuild and audit
// ============================================================================

#[test]
fn test_rebuild_of_consistent_cascade_reports_no_drift() {
    let (store, root) = seeded();
    let bob = store
        .insert_node(root.id, "bob".into(), Some(root.root_node_id))
        .unwrap();
    store.insert_node(root.id, "carol".into(), Some(bob.id)).unwrap();

    let rebuild = store.rebuild_summary(root.id).unwrap();
    assert!(!rebuild.drifted);
    assert_eq!(rebuild.after.total_reach, 3);
    assert_eq!(rebuild.after.max_depth, 2);

    let audit = store.audit(root.id).unwrap();
    assert!(audit.is_consistent(), "{}", audit.issues_summary());
    assert_eq!(audit.node_count, 3);
}

#[test]
fn test_operations_on_unknown_root() {
    let (store, _root) = seeded();
    let missing = RootId::new();

    assert_eq!(store.get_root(missing).unwrap_err().code(), ErrorCode::RootNotFound);
    assert_eq!(store.cascade(missing).unwrap_err().code(), ErrorCode::RootNotFound);
    assert_eq!(
        store.rebuild_summary(missing).unwrap_err().code(),
        ErrorCode::RootNotFound
    );
    assert_eq!(store.audit(missing).unwrap_err().code(), ErrorCode::RootNotFound);
    assert_eq!(
        store
            .set_flag(missing, &"alice".into(), EngagementAction::Played)
            .unwrap_err()
            .code(),
        ErrorCode::RootNotFound
    );
}
