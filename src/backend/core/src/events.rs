//! Inbound event records and their outcomes.
//!
//! Events arrive from the share/forward collaborators already authenticated;
//! validation here only rejects records that cannot name a participant or a
//! piece of content.

use serde::{Deserialize, Serialize};

use crate::cascade::{
    CascadeSummary, ContentRef, EngagementAction, NodeId, PropagationNode, RootId, ShareRoot,
    UserId,
};
use crate::error::{CascadeError, Result};

/// Longest accepted user id or content reference, in bytes.
pub const MAX_REFERENCE_LEN: usize = 256;

fn check_reference(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CascadeError::validation(format!("{} must not be empty", field))
            .with_context("field", field));
    }
    if value.len() > MAX_REFERENCE_LEN {
        return Err(CascadeError::validation(format!(
            "{} must be at most {} bytes",
            field, MAX_REFERENCE_LEN
        ))
        .with_context("field", field)
        .with_context("length", value.len()));
    }
    Ok(())
}

/// A user shares content for the first time, starting a cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEvent {
    /// Caller-chosen root id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_candidate_id: Option<RootId>,
    pub origin_user: UserId,
    pub content_ref: ContentRef,
}

impl ShareEvent {
    pub fn new(origin_user: impl Into<String>, content_ref: impl Into<String>) -> Self {
        Self {
            root_candidate_id: None,
            origin_user: UserId::new(origin_user),
            content_ref: ContentRef::new(content_ref),
        }
    }

    pub fn with_root_id(mut self, root_id: RootId) -> Self {
        self.root_candidate_id = Some(root_id);
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_reference("origin_user", self.origin_user.as_str())?;
        check_reference("content_ref", self.content_ref.as_str())
    }
}

/// A user received the content through `via_node_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardEvent {
    pub root_id: RootId,
    pub acting_user: UserId,
    pub via_node_id: NodeId,
}

impl ForwardEvent {
    pub fn new(root_id: RootId, acting_user: impl Into<String>, via_node_id: NodeId) -> Self {
        Self {
            root_id,
            acting_user: UserId::new(acting_user),
            via_node_id,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_reference("acting_user", self.acting_user.as_str())
    }
}

/// A participant played, saved, forwarded or dismissed the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub root_id: RootId,
    pub user_id: UserId,
    pub action: EngagementAction,
}

impl EngagementEvent {
    pub fn new(root_id: RootId, user_id: impl Into<String>, action: EngagementAction) -> Self {
        Self {
            root_id,
            user_id: UserId::new(user_id),
            action,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_reference("user_id", self.user_id.as_str())
    }
}

/// Any inbound event, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CascadeEvent {
    Share(ShareEvent),
    Forward(ForwardEvent),
    Engagement(EngagementEvent),
}

impl CascadeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Share(_) => "share",
            Self::Forward(_) => "forward",
            Self::Engagement(_) => "engagement",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Share(event) => event.validate(),
            Self::Forward(event) => event.validate(),
            Self::Engagement(event) => event.validate(),
        }
    }
}

/// Result of applying a forward event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardOutcome {
    /// The acting user's node
    pub node: PropagationNode,

    /// `true` when the user already had a node and nothing was inserted
    pub replayed: bool,

    /// Summary right after the insert (or as read for a replay)
    pub summary: CascadeSummary,
}

/// Result of applying any [`CascadeEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    RootCreated { root: ShareRoot },
    Forwarded(ForwardOutcome),
    Engaged { node: PropagationNode },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_tagged_event_parsing() {
        let root_id = RootId::new();
        let via = NodeId::new();
        let json = serde_json::json!({
            "type": "forward",
            "root_id": root_id,
            "acting_user": "bob",
            "via_node_id": via,
        });

        let event: CascadeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.kind(), "forward");
        match event {
            CascadeEvent::Forward(forward) => {
                assert_eq!(forward.root_id, root_id);
                assert_eq!(forward.via_node_id, via);
                assert_eq!(forward.acting_user.as_str(), "bob");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_share_without_candidate_id() {
        let event: CascadeEvent = serde_json::from_value(serde_json::json!({
            "type": "share",
            "origin_user": "alice",
            "content_ref": "spotify:track:1",
        }))
        .unwrap();

        match event {
            CascadeEvent::Share(share) => assert!(share.root_candidate_id.is_none()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        assert!(ShareEvent::new("alice", "track").validate().is_ok());

        let err = ShareEvent::new("  ", "track").validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = ShareEvent::new("alice", "x".repeat(MAX_REFERENCE_LEN + 1))
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let event = EngagementEvent::new(RootId::new(), "", EngagementAction::Played);
        assert!(event.validate().is_err());
    }
}
