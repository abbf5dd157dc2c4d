//! Arena-backed propagation tree for a single share root.
//!
//! Nodes are addressed by id only. Parent and child navigation goes through the
//! `nodes`, `participants` and `children` indexes; no node holds a reference to
//! another node.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::node::{EngagementAction, NodeId, PropagationNode, RootId, ShareRoot, UserId};
use super::summary::CascadeSummary;
use crate::aggregator::{Aggregate, Aggregator, SummaryRebuild};
use crate::error::{CascadeError, ErrorContext, Result};

/// Everything a cascade persists, in a flat form suitable for snapshots and
/// full reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeRecord {
    pub root: ShareRoot,
    pub summary: CascadeSummary,
    pub nodes: Vec<PropagationNode>,
}

/// The propagation tree of one share root together with its summary.
#[derive(Debug, Clone)]
pub struct CascadeTree {
    root: ShareRoot,

    /// Arena of all nodes, root node included
    nodes: HashMap<NodeId, PropagationNode>,

    /// One node per participating user
    participants: HashMap<UserId, NodeId>,

    /// Child ids per node, in insertion order
    children: HashMap<NodeId, Vec<NodeId>>,

    summary: CascadeSummary,
}

impl CascadeTree {
    /// Create a tree holding only the root node. Reach 1, depth 0.
    pub fn new(root: ShareRoot) -> Self {
        let root_node = PropagationNode::root(
            root.id,
            root.root_node_id,
            root.origin_user.clone(),
            root.created_at,
        );

        let mut summary = CascadeSummary::empty(root.id);
        summary.apply(&root_node);

        let mut tree = Self {
            root,
            nodes: HashMap::new(),
            participants: HashMap::new(),
            children: HashMap::new(),
            summary,
        };
        tree.index(root_node);
        tree
    }

    /// Rebuild a tree from persisted parts.
    ///
    /// The structure is audited before it is accepted and the summary is
    /// always recomputed from the nodes; the persisted summary only serves to
    /// report drift.
    pub fn from_record(record: CascadeRecord) -> Result<(Self, SummaryRebuild)> {
        let CascadeRecord { root, summary, nodes } = record;
        let root_id = root.id;

        let mut tree = Self {
            root,
            nodes: HashMap::with_capacity(nodes.len()),
            participants: HashMap::with_capacity(nodes.len()),
            children: HashMap::new(),
            summary,
        };

        for node in nodes {
            if node.root_id != root_id {
                return Err(CascadeError::snapshot_corrupted(format!(
                    "node {} of cascade {} claims cascade {}",
                    node.id, root_id, node.root_id
                )));
            }
            if tree.nodes.contains_key(&node.id) {
                return Err(CascadeError::snapshot_corrupted(format!(
                    "node {} appears twice in cascade {}",
                    node.id, root_id
                )));
            }
            if tree.participants.contains_key(&node.acting_user) {
                return Err(CascadeError::snapshot_corrupted(format!(
                    "user {} appears twice in cascade {}",
                    node.acting_user, root_id
                )));
            }
            tree.index(node);
        }

        let audit = Aggregator::audit(&tree);
        if !audit.is_structurally_sound() {
            return Err(CascadeError::snapshot_corrupted(format!(
                "cascade {} failed audit: {}",
                root_id,
                audit.issues_summary()
            )));
        }

        let rebuild = tree.rebuild_summary();
        Ok((tree, rebuild))
    }

    /// Append a node for `acting_user` under `parent_id`.
    ///
    /// Every check runs before the first mutation, so a rejected insert leaves
    /// the tree and its summary untouched.
    pub fn insert(
        &mut self,
        acting_user: UserId,
        parent_id: Option<NodeId>,
    ) -> Result<PropagationNode> {
        let Some(parent_id) = parent_id else {
            return Err(CascadeError::duplicate_root(self.root.id));
        };

        let parent = self
            .nodes
            .get(&parent_id)
            .ok_or_else(|| CascadeError::parent_not_found(self.root.id, parent_id))?;

        if let Some(existing) = self.participants.get(&acting_user) {
            return Err(CascadeError::duplicate_participant(
                self.root.id,
                &acting_user,
                *existing,
            ));
        }

        let node = PropagationNode::child_of(parent, acting_user);

        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.flags.set(EngagementAction::Forwarded);
        }
        self.summary.apply(&node);
        self.index(node.clone());

        Ok(node)
    }

    /// Set an engagement flag on the node of `user`.
    pub fn set_flag(&mut self, user: &UserId, action: EngagementAction) -> Result<PropagationNode> {
        let node_id = self
            .participants
            .get(user)
            .ok_or_else(|| CascadeError::participant_not_found(self.root.id, user))?;

        let node = self
            .nodes
            .get_mut(node_id)
            .context(format!("participant index points at missing node {}", node_id))?;

        node.flags.set(action);
        Ok(node.clone())
    }

    /// Recompute the summary with one full scan and make it authoritative.
    pub fn rebuild_summary(&mut self) -> SummaryRebuild {
        let before = self.summary.clone();
        let mut after = Aggregator::rebuild(self.root.id, self.nodes.values());
        if before.same_aggregates(&after) {
            after.updated_at = before.updated_at;
        } else {
            warn!(
                root_id = %self.root.id,
                stored_reach = before.total_reach,
                stored_depth = before.max_depth,
                rebuilt_reach = after.total_reach,
                rebuilt_depth = after.max_depth,
                "Cascade summary drifted, replacing with rebuilt summary"
            );
        }
        self.summary = after.clone();
        SummaryRebuild::new(before, after)
    }

    pub fn root(&self) -> &ShareRoot {
        &self.root
    }

    pub fn id(&self) -> RootId {
        self.root.id
    }

    pub fn summary(&self) -> &CascadeSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, node_id: NodeId) -> Option<&PropagationNode> {
        self.nodes.get(&node_id)
    }

    pub fn root_node(&self) -> Option<&PropagationNode> {
        self.nodes.get(&self.root.root_node_id)
    }

    pub fn participant(&self, user: &UserId) -> Option<&PropagationNode> {
        self.participants.get(user).and_then(|id| self.nodes.get(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PropagationNode> {
        self.nodes.values()
    }

    /// Child ids of a node, `None` if the node does not exist.
    pub fn child_ids(&self, node_id: NodeId) -> Option<&[NodeId]> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }
        Some(self.children.get(&node_id).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn children(&self, node_id: NodeId) -> Result<Vec<PropagationNode>> {
        let ids = self
            .child_ids(node_id)
            .ok_or_else(|| CascadeError::node_not_found(self.root.id, node_id))?;

        Ok(ids.iter().filter_map(|id| self.nodes.get(id)).cloned().collect())
    }

    /// Nodes without children, newest first.
    pub fn frontier(&self) -> Vec<PropagationNode> {
        let mut leaves: Vec<PropagationNode> = self
            .nodes
            .values()
            .filter(|node| self.children.get(&node.id).map_or(true, Vec::is_empty))
            .cloned()
            .collect();
        leaves.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        leaves
    }

    /// Chain of nodes from the root node down to the node of `user`.
    pub fn path_to(&self, user: &UserId) -> Option<Vec<PropagationNode>> {
        let mut current = self.participant(user)?;
        let mut path = vec![current.clone()];

        while let Some(parent_id) = current.parent_id {
            current = self.nodes.get(&parent_id)?;
            path.push(current.clone());
            if path.len() > self.nodes.len() {
                // Only reachable if the arena was corrupted into a loop.
                return None;
            }
        }

        path.reverse();
        Some(path)
    }

    /// Flat copy of the tree, nodes ordered by depth then creation time.
    pub fn to_record(&self) -> CascadeRecord {
        let mut nodes: Vec<PropagationNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        CascadeRecord {
            root: self.root.clone(),
            summary: self.summary.clone(),
            nodes,
        }
    }

    fn index(&mut self, node: PropagationNode) {
        if let Some(parent_id) = node.parent_id {
            self.children.entry(parent_id).or_default().push(node.id);
        }
        self.participants.insert(node.acting_user.clone(), node.id);
        self.nodes.insert(node.id, node);
    }
}

/// Build a fresh share root stamped now.
pub fn new_share_root(
    id: RootId,
    origin_user: UserId,
    content_ref: super::node::ContentRef,
) -> ShareRoot {
    ShareRoot {
        id,
        origin_user,
        content_ref,
        root_node_id: NodeId::new(),
        created_at: Utc::now(),
    }
}
