//! Tests for the cascade query service.
//!
//! Tests cover:
//! - Full cascade views and engagement tallies
//! - User positions, frontier and paths
//! - Cascade listing
//! - Audits

use std::sync::Arc;

use cascade_core::builder::TreeBuilder;
use cascade_core::cascade::{EngagementAction, NodeId, RootId, ShareRoot};
use cascade_core::error::ErrorCode;
use cascade_core::events::{EngagementEvent, ForwardEvent, ShareEvent};
use cascade_core::feed::SummaryFeed;
use cascade_core::query::{CascadeQueryService, Participation};
use cascade_core::store::MemoryStore;

struct Fixture {
    builder: TreeBuilder,
    query: CascadeQueryService,
    root: ShareRoot,
    bob: NodeId,
    carol: NodeId,
}

/// alice -> bob -> carol, alice -> dave
fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let builder = TreeBuilder::new(store.clone(), SummaryFeed::new(16));
    let query = CascadeQueryService::new(store);

    let root = builder.share(ShareEvent::new("alice", "track")).unwrap();
    let bob = builder
        .forward(ForwardEvent::new(root.id, "bob", root.root_node_id))
        .unwrap()
        .node
        .id;
    let carol = builder
        .forward(ForwardEvent::new(root.id, "carol", bob))
        .unwrap()
        .node
        .id;
    builder
        .forward(ForwardEvent::new(root.id, "dave", root.root_node_id))
        .unwrap();

    Fixture {
        builder,
        query,
        root,
        bob,
        carol,
    }
}

#[test]
fn test_get_cascade() {
    let f = fixture();
    f.builder
        .engage(EngagementEvent::new(f.root.id, "carol", EngagementAction::Played))
        .unwrap();
    f.builder
        .engage(EngagementEvent::new(f.root.id, "dave", EngagementAction::Dismissed))
        .unwrap();

    let view = f.query.get_cascade(f.root.id).unwrap();
    assert_eq!(view.root.id, f.root.id);
    assert_eq!(view.nodes.len(), 4);
    assert_eq!(view.summary.total_reach, 4);
    assert_eq!(view.summary.max_depth, 2);

    // alice and bob forwarded
    assert_eq!(view.engagement.forwarded, 2);
    assert_eq!(view.engagement.played, 1);
    assert_eq!(view.engagement.dismissed, 1);
    assert_eq!(view.engagement.saved, 0);
}

#[test]
fn test_get_summary_matches_view() {
    let f = fixture();
    let summary = f.query.get_summary(f.root.id).unwrap();
    let view = f.query.get_cascade(f.root.id).unwrap();
    assert!(summary.same_aggregates(&view.summary));
}

#[test]
fn test_user_position() {
    let f = fixture();

    match f.query.get_user_position(f.root.id, &"carol".into()).unwrap() {
        Participation::Participating { node } => {
            assert_eq!(node.id, f.carol);
            assert_eq!(node.depth, 2);
        }
        Participation::NotParticipating => panic!("carol should participate"),
    }

    let position = f.query.get_user_position(f.root.id, &"mallory".into()).unwrap();
    assert_eq!(position, Participation::NotParticipating);
}

#[test]
fn test_frontier_is_the_leaves() {
    let f = fixture();
    let frontier = f.query.get_frontier(f.root.id).unwrap();

    let mut users: Vec<&str> = frontier.iter().map(|n| n.acting_user.as_str()).collect();
    users.sort();
    assert_eq!(users, vec!["carol", "dave"]);

    for pair in frontier.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
}

#[test]
fn test_path_from_root() {
    let f = fixture();
    let path = f.query.get_path(f.root.id, &"carol".into()).unwrap();
    let ids: Vec<NodeId> = path.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![f.root.root_node_id, f.bob, f.carol]);

    let path = f.query.get_path(f.root.id, &"alice".into()).unwrap();
    assert_eq!(path.len(), 1);
}

#[test]
fn test_list_children() {
    let f = fixture();
    let children = f.query.list_children(f.root.id, f.root.root_node_id).unwrap();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|n| n.parent_id == Some(f.root.root_node_id)));

    assert!(f.query.list_children(f.root.id, f.carol).unwrap().is_empty());
}

#[test]
fn test_list_cascades() {
    let f = fixture();
    let other = f.builder.share(ShareEvent::new("zoe", "album")).unwrap();

    let listing = f.query.list_cascades();
    assert_eq!(listing.len(), 2);
    assert_eq!(f.query.cascade_count(), 2);

    let zoe = listing.iter().find(|l| l.root.id == other.id).unwrap();
    assert_eq!(zoe.summary.total_reach, 1);
    let alice = listing.iter().find(|l| l.root.id == f.root.id).unwrap();
    assert_eq!(alice.summary.total_reach, 4);
}

#[test]
fn test_verify_healthy_cascade() {
    let f = fixture();
    let audit = f.query.verify(f.root.id).unwrap();
    assert!(audit.is_structurally_sound());
    assert!(audit.summary_matches());
    assert!(audit.issues.is_empty());
    assert_eq!(audit.rebuilt.max_depth, 2);
}

#[test]
fn test_queries_on_unknown_root() {
    let f = fixture();
    let missing = RootId::new();

    assert_eq!(f.query.get_cascade(missing).unwrap_err().code(), ErrorCode::RootNotFound);
    assert_eq!(f.query.get_frontier(missing).unwrap_err().code(), ErrorCode::RootNotFound);
    assert_eq!(
        f.query.get_path(missing, &"bob".into()).unwrap_err().code(),
        ErrorCode::RootNotFound
    );
    assert_eq!(f.query.verify(missing).unwrap_err().code(), ErrorCode::RootNotFound);
}
