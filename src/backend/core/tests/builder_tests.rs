//! Tests for the tree builder.
//!
//! Tests cover:
//! - Share, forward and engagement events
//! - Idempotent forward replay
//! - Event validation
//! - Summary feed publication
//! - Dispatch of tagged events

use std::sync::Arc;

use cascade_core::builder::TreeBuilder;
use cascade_core::cascade::{EngagementAction, NodeId, RootId};
use cascade_core::error::ErrorCode;
use cascade_core::events::{
    CascadeEvent, EngagementEvent, EventOutcome, ForwardEvent, ShareEvent, MAX_REFERENCE_LEN,
};
use cascade_core::feed::SummaryFeed;
use cascade_core::store::{MemoryStore, PropagationStore};

fn builder() -> TreeBuilder {
    TreeBuilder::new(Arc::new(MemoryStore::new()), SummaryFeed::new(64))
}

// ============================================================================
// Share
// ============================================================================

#[test]
fn test_share_with_candidate_id() {
    let builder = builder();
    let wanted = RootId::new();

    let root = builder
        .share(ShareEvent::new("alice", "track").with_root_id(wanted))
        .unwrap();
    assert_eq!(root.id, wanted);

    let err = builder
        .share(ShareEvent::new("bob", "track").with_root_id(wanted))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateRoot);
}

#[test]
fn test_share_rejects_blank_fields() {
    let builder = builder();

    let err = builder.share(ShareEvent::new("  ", "track")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = builder.share(ShareEvent::new("alice", "")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let long = "x".repeat(MAX_REFERENCE_LEN + 1);
    let err = builder.share(ShareEvent::new(long, "track")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    assert!(builder.store().root_ids().is_empty());
}

// ============================================================================
// Forward
// ============================================================================

#[test]
fn test_forward_chain() {
    let builder = builder();
    let root = builder.share(ShareEvent::new("alice", "track")).unwrap();

    let bob = builder
        .forward(ForwardEvent::new(root.id, "bob", root.root_node_id))
        .unwrap();
    let carol = builder
        .forward(ForwardEvent::new(root.id, "carol", bob.node.id))
        .unwrap();

    assert_eq!(bob.node.depth, 1);
    assert_eq!(carol.node.depth, 2);
    assert_eq!(carol.node.parent_id, Some(bob.node.id));
    assert_eq!(carol.summary.total_reach, 3);
    assert_eq!(carol.summary.max_depth, 2);
}

#[test]
fn test_replay_through_different_parent_keeps_first_node() {
    let builder = builder();
    let root = builder.share(ShareEvent::new("alice", "track")).unwrap();
    let bob = builder
        .forward(ForwardEvent::new(root.id, "bob", root.root_node_id))
        .unwrap();
    let carol = builder
        .forward(ForwardEvent::new(root.id, "carol", root.root_node_id))
        .unwrap();

    // Bob receives the content again, this time from Carol.
    let again = builder
        .forward(ForwardEvent::new(root.id, "bob", carol.node.id))
        .unwrap();

    assert!(again.replayed);
    assert_eq!(again.node.id, bob.node.id);
    assert_eq!(again.node.parent_id, Some(root.root_node_id));
    assert_eq!(again.summary.total_reach, 3);
}

#[test]
fn test_origin_user_forward_is_replay() {
    let builder = builder();
    let root = builder.share(ShareEvent::new("alice", "track")).unwrap();
    let bob = builder
        .forward(ForwardEvent::new(root.id, "bob", root.root_node_id))
        .unwrap();

    let outcome = builder
        .forward(ForwardEvent::new(root.id, "alice", bob.node.id))
        .unwrap();
    assert!(outcome.replayed);
    assert_eq!(outcome.node.id, root.root_node_id);
}

#[test]
fn test_forward_rejections_leave_summary_untouched() {
    let builder = builder();
    let root = builder.share(ShareEvent::new("alice", "track")).unwrap();

    let err = builder
        .forward(ForwardEvent::new(root.id, "bob", NodeId::new()))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ParentNotFound);

    let err = builder
        .forward(ForwardEvent::new(root.id, "", root.root_node_id))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let summary = builder.store().get_summary(root.id).unwrap();
    assert_eq!(summary.total_reach, 1);
}

// ============================================================================
// Feed
// ============================================================================

#[test]
fn test_inserts_publish_and_replays_do_not() {
    let builder = builder();
    let mut rx = builder.feed().subscribe();

    let root = builder.share(ShareEvent::new("alice", "track")).unwrap();
    builder
        .forward(ForwardEvent::new(root.id, "bob", root.root_node_id))
        .unwrap();
    builder
        .forward(ForwardEvent::new(root.id, "bob", root.root_node_id))
        .unwrap();

    let first = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    assert!(rx.try_recv().is_err());

    assert_eq!(first.summary.total_reach, 1);
    assert_eq!(second.summary.total_reach, 2);
    assert!(second.sequence > first.sequence);
    assert!(second.node_id.is_some());
}

#[test]
fn test_rebuild_publishes_without_node() {
    let builder = builder();
    let root = builder.share(ShareEvent::new("alice", "track")).unwrap();
    let mut rx = builder.feed().subscribe();

    let rebuild = builder.rebuild_summary(root.id).unwrap();
    assert!(!rebuild.drifted);

    let update = rx.try_recv().unwrap();
    assert_eq!(update.root_id, root.id);
    assert!(update.node_id.is_none());
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_apply_tagged_events() {
    let builder = builder();

    let event: CascadeEvent = serde_json::from_value(serde_json::json!({
        "type": "share",
        "origin_user": "alice",
        "content_ref": "track"
    }))
    .unwrap();
    let root = match builder.apply(event).unwrap() {
        EventOutcome::RootCreated { root } => root,
        other => panic!("unexpected outcome: {other:?}"),
    };

    let outcome = builder
        .apply(CascadeEvent::Forward(ForwardEvent::new(
            root.id,
            "bob",
            root.root_node_id,
        )))
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Forwarded(ref f) if !f.replayed));

    let outcome = builder
        .apply(CascadeEvent::Engagement(EngagementEvent::new(
            root.id,
            "bob",
            EngagementAction::Saved,
        )))
        .unwrap();
    match outcome {
        EventOutcome::Engaged { node } => assert!(node.flags.saved),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_engagement_on_unknown_root() {
    let builder = builder();
    let err = builder
        .engage(EngagementEvent::new(RootId::new(), "bob", EngagementAction::Played))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RootNotFound);
}
