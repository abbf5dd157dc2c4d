//! Propagation Store: keyed storage for share roots, nodes and summaries.
//!
//! This module handles:
//! - The [`PropagationStore`] trait every backend implements
//! - The in-memory backend with one lock per share root
//! - JSON snapshots of the whole store for restart recovery

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::{SnapshotFile, StoreSnapshot};

use crate::aggregator::{SummaryRebuild, TreeAudit};
use crate::cascade::{
    CascadeRecord, CascadeSummary, ContentRef, EngagementAction, NodeId, PropagationNode, RootId,
    ShareRoot, UserId,
};
use crate::error::Result;

/// A freshly inserted node and the cascade summary as it stood right after
/// the insert, read under the same write lock.
#[derive(Debug, Clone)]
pub struct NodeInsertion {
    pub node: PropagationNode,
    pub summary: CascadeSummary,
}

/// Atomic, keyed access to cascades.
///
/// All mutations of a single root are serialized; a mutation and the summary
/// update it causes are observed together or not at all.
pub trait PropagationStore: Send + Sync {
    /// Create a root, its depth-0 node and a summary of reach 1, depth 0.
    ///
    /// Fails with `DuplicateRoot` only when `candidate_id` is already taken.
    fn create_root(
        &self,
        candidate_id: Option<RootId>,
        origin_user: UserId,
        content_ref: ContentRef,
    ) -> Result<ShareRoot>;

    /// Append a node under `parent_id`. Depth is derived from the parent.
    ///
    /// The returned summary includes this insert and no later one.
    fn append_node(
        &self,
        root_id: RootId,
        acting_user: UserId,
        parent_id: Option<NodeId>,
    ) -> Result<NodeInsertion>;

    /// [`append_node`](Self::append_node) without the summary.
    fn insert_node(
        &self,
        root_id: RootId,
        acting_user: UserId,
        parent_id: Option<NodeId>,
    ) -> Result<PropagationNode> {
        self.append_node(root_id, acting_user, parent_id)
            .map(|inserted| inserted.node)
    }

    fn get_root(&self, root_id: RootId) -> Result<ShareRoot>;

    fn get_summary(&self, root_id: RootId) -> Result<CascadeSummary>;

    fn get_node(&self, root_id: RootId, node_id: NodeId) -> Result<PropagationNode>;

    /// The node of `user`, if the user participates.
    fn find_participant(&self, root_id: RootId, user: &UserId) -> Result<Option<PropagationNode>>;

    fn list_children(&self, root_id: RootId, node_id: NodeId) -> Result<Vec<PropagationNode>>;

    fn list_nodes(&self, root_id: RootId) -> Result<Vec<PropagationNode>>;

    /// Root, nodes and summary read under one lock.
    fn cascade(&self, root_id: RootId) -> Result<CascadeRecord>;

    /// Leaf nodes, newest first.
    fn frontier(&self, root_id: RootId) -> Result<Vec<PropagationNode>>;

    /// Nodes from the root node down to the node of `user`.
    fn path_to(&self, root_id: RootId, user: &UserId) -> Result<Option<Vec<PropagationNode>>>;

    fn set_flag(
        &self,
        root_id: RootId,
        user: &UserId,
        action: EngagementAction,
    ) -> Result<PropagationNode>;

    /// Replace the stored summary with a full recount.
    fn rebuild_summary(&self, root_id: RootId) -> Result<SummaryRebuild>;

    fn audit(&self, root_id: RootId) -> Result<TreeAudit>;

    /// Ids of every known root, oldest first.
    fn root_ids(&self) -> Vec<RootId>;

    /// Consistent per-root copy of the whole store.
    fn snapshot(&self) -> StoreSnapshot;

    /// Load a snapshot. Every cascade is validated before any is installed;
    /// returns one rebuild report per restored cascade.
    fn restore(&self, snapshot: StoreSnapshot) -> Result<Vec<SummaryRebuild>>;
}
