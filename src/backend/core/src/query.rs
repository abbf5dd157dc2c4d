//! Cascade Query Service: read-only projections over the store.
//!
//! Every projection is assembled under a single per-root read lock, so a
//! reader never sees a node without the summary increment it caused.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::aggregator::{Aggregator, TreeAudit};
use crate::cascade::{
    CascadeRecord, CascadeSummary, EngagementTally, NodeId, PropagationNode, RootId, ShareRoot,
    UserId,
};
use crate::error::{CascadeError, Result};
use crate::store::PropagationStore;

/// Full picture of one cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeView {
    pub root: ShareRoot,
    pub summary: CascadeSummary,
    pub engagement: EngagementTally,

    /// Nodes ordered by depth, then creation time
    pub nodes: Vec<PropagationNode>,
}

impl From<CascadeRecord> for CascadeView {
    fn from(record: CascadeRecord) -> Self {
        let engagement = Aggregator::tally(&record.nodes);
        Self {
            root: record.root,
            summary: record.summary,
            engagement,
            nodes: record.nodes,
        }
    }
}

/// Where a user stands in a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Participation {
    Participating { node: PropagationNode },
    NotParticipating,
}

impl Participation {
    pub fn node(&self) -> Option<&PropagationNode> {
        match self {
            Self::Participating { node } => Some(node),
            Self::NotParticipating => None,
        }
    }
}

/// One row of the cascade listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeListing {
    pub root: ShareRoot,
    pub summary: CascadeSummary,
}

/// Read-side API over a [`PropagationStore`].
#[derive(Clone)]
pub struct CascadeQueryService {
    store: Arc<dyn PropagationStore>,
}

impl CascadeQueryService {
    pub fn new(store: Arc<dyn PropagationStore>) -> Self {
        Self { store }
    }

    /// Root, every node, the summary and an engagement tally.
    #[instrument(skip(self))]
    pub fn get_cascade(&self, root_id: RootId) -> Result<CascadeView> {
        let view = CascadeView::from(self.store.cascade(root_id)?);
        debug!(nodes = view.nodes.len(), "Cascade read");
        Ok(view)
    }

    pub fn get_summary(&self, root_id: RootId) -> Result<CascadeSummary> {
        self.store.get_summary(root_id)
    }

    pub fn get_user_position(&self, root_id: RootId, user: &UserId) -> Result<Participation> {
        Ok(match self.store.find_participant(root_id, user)? {
            Some(node) => Participation::Participating { node },
            None => Participation::NotParticipating,
        })
    }

    /// Leaf nodes, newest first. A cascade that was never forwarded has the
    /// root node as its only leaf.
    pub fn get_frontier(&self, root_id: RootId) -> Result<Vec<PropagationNode>> {
        self.store.frontier(root_id)
    }

    /// Who reached whom: nodes from the root node down to `user`.
    pub fn get_path(&self, root_id: RootId, user: &UserId) -> Result<Vec<PropagationNode>> {
        self.store
            .path_to(root_id, user)?
            .ok_or_else(|| CascadeError::participant_not_found(root_id, user))
    }

    pub fn list_children(&self, root_id: RootId, node_id: NodeId) -> Result<Vec<PropagationNode>> {
        self.store.list_children(root_id, node_id)
    }

    /// Every cascade with its summary, oldest first.
    pub fn list_cascades(&self) -> Vec<CascadeListing> {
        self.store
            .root_ids()
            .into_iter()
            .filter_map(|root_id| {
                let root = self.store.get_root(root_id).ok()?;
                let summary = self.store.get_summary(root_id).ok()?;
                Some(CascadeListing { root, summary })
            })
            .collect()
    }

    /// Structural audit of one cascade.
    pub fn verify(&self, root_id: RootId) -> Result<TreeAudit> {
        self.store.audit(root_id)
    }

    pub fn cascade_count(&self) -> usize {
        self.store.root_ids().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{ContentRef, EngagementAction};
    use crate::error::ErrorCode;
    use crate::store::MemoryStore;

    fn seeded() -> (CascadeQueryService, Arc<MemoryStore>, ShareRoot) {
        let store = Arc::new(MemoryStore::new());
        let root = store
            .create_root(None, "alice".into(), ContentRef::new("track"))
            .unwrap();
        let query = CascadeQueryService::new(store.clone());
        (query, store, root)
    }

    #[test]
    fn test_position_of_participant_and_stranger() {
        let (query, store, root) = seeded();
        let bob = store
            .insert_node(root.id, "bob".into(), Some(root.root_node_id))
            .unwrap();

        let position = query.get_user_position(root.id, &"bob".into()).unwrap();
        assert_eq!(position.node().map(|n| n.id), Some(bob.id));

        let position = query.get_user_position(root.id, &"zoe".into()).unwrap();
        assert_eq!(position, Participation::NotParticipating);

        let err = query
            .get_user_position(RootId::new(), &"bob".into())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RootNotFound);
    }

    #[test]
    fn test_view_carries_tally() {
        let (query, store, root) = seeded();
        store
            .insert_node(root.id, "bob".into(), Some(root.root_node_id))
            .unwrap();
        store
            .set_flag(root.id, &"bob".into(), EngagementAction::Played)
            .unwrap();

        let view = query.get_cascade(root.id).unwrap();
        assert_eq!(view.nodes.len(), 2);
        assert_eq!(view.nodes[0].depth, 0);
        assert_eq!(view.engagement.played, 1);
        assert_eq!(view.engagement.forwarded, 1);
    }

    #[test]
    fn test_lone_root_is_its_own_frontier() {
        let (query, _store, root) = seeded();
        let frontier = query.get_frontier(root.id).unwrap();
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier[0].id, root.root_node_id);
    }

    #[test]
    fn test_path_for_stranger() {
        let (query, _store, root) = seeded();
        let err = query.get_path(root.id, &"zoe".into()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NodeNotFound);
    }
}
