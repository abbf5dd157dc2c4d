//! Cascade aggregates: incremental updates, full rebuilds and tree audits.
//!
//! The summary of a cascade is maintained with an O(1) update per inserted
//! node. The rebuild path recounts every node once and is the authoritative
//! reconciliation when the incremental path is suspected to have drifted.
//! The audit walks the tree from its root node and checks the shape
//! invariants the store is supposed to uphold.

use std::collections::HashMap;

use petgraph::algo::{dijkstra, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::cascade::{
    CascadeSummary, CascadeTree, EngagementTally, NodeId, PropagationNode, RootId,
};

// =============================================================================
// Aggregate Trait
// =============================================================================

/// A value folded over the nodes of a cascade.
///
/// `apply` must be a pure function of `(self, node) -> self'`; the same node
/// set always folds to the same value regardless of where the fold starts.
pub trait Aggregate {
    /// Count one node.
    fn apply(&mut self, node: &PropagationNode);
}

impl Aggregate for CascadeSummary {
    fn apply(&mut self, node: &PropagationNode) {
        self.total_reach += 1;
        self.max_depth = self.max_depth.max(node.depth);
        self.updated_at = self.updated_at.max(node.created_at);
    }
}

impl Aggregate for EngagementTally {
    fn apply(&mut self, node: &PropagationNode) {
        let flags = &node.flags;
        self.played += u64::from(flags.played);
        self.saved += u64::from(flags.saved);
        self.forwarded += u64::from(flags.forwarded);
        self.dismissed += u64::from(flags.dismissed);
    }
}

// =============================================================================
// Rebuild
// =============================================================================

/// Outcome of replacing a stored summary with a recomputed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRebuild {
    pub before: CascadeSummary,
    pub after: CascadeSummary,
    /// Whether the stored aggregates differed from the recomputed ones
    pub drifted: bool,
}

impl SummaryRebuild {
    pub fn new(before: CascadeSummary, after: CascadeSummary) -> Self {
        let drifted = !before.same_aggregates(&after);
        Self { before, after, drifted }
    }
}

/// Stateless entry points for folding and auditing cascades.
pub struct Aggregator;

impl Aggregator {
    /// Fold `nodes` into `seed`.
    pub fn fold<'a, A, I>(seed: A, nodes: I) -> A
    where
        A: Aggregate,
        I: IntoIterator<Item = &'a PropagationNode>,
    {
        nodes.into_iter().fold(seed, |mut acc, node| {
            acc.apply(node);
            acc
        })
    }

    /// Recompute a summary from scratch with a single scan.
    pub fn rebuild<'a, I>(root_id: RootId, nodes: I) -> CascadeSummary
    where
        I: IntoIterator<Item = &'a PropagationNode>,
    {
        Self::fold(CascadeSummary::empty(root_id), nodes)
    }

    /// Count engagement flags across `nodes`.
    pub fn tally<'a, I>(nodes: I) -> EngagementTally
    where
        I: IntoIterator<Item = &'a PropagationNode>,
    {
        Self::fold(EngagementTally::default(), nodes)
    }

    /// Walk the tree from its root node and report every broken invariant.
    pub fn audit(tree: &CascadeTree) -> TreeAudit {
        let root_id = tree.id();
        let root_node_id = tree.root().root_node_id;
        let mut issues = Vec::new();

        let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(tree.len(), tree.len());
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(tree.len());
        for node in tree.nodes() {
            index.insert(node.id, graph.add_node(node.id));
        }

        for node in tree.nodes() {
            let child_idx = index[&node.id];
            match node.parent_id {
                None if node.id != root_node_id => {
                    issues.push(AuditIssue::ExtraRoot { node_id: node.id });
                }
                None => {}
                Some(_) if node.id == root_node_id => {
                    issues.push(AuditIssue::RootHasParent { node_id: node.id });
                }
                Some(parent_id) => match index.get(&parent_id) {
                    Some(&parent_idx) => {
                        graph.add_edge(parent_idx, child_idx, ());
                    }
                    None => issues.push(AuditIssue::DanglingParent {
                        node_id: node.id,
                        parent_id,
                    }),
                },
            }
        }

        if is_cyclic_directed(&graph) {
            issues.push(AuditIssue::Cycle);
        }

        match index.get(&root_node_id) {
            Some(&root_idx) => {
                let depths = dijkstra(&graph, root_idx, None, |_| 1u32);
                for node in tree.nodes() {
                    match depths.get(&index[&node.id]) {
                        None => issues.push(AuditIssue::Unreachable { node_id: node.id }),
                        Some(&walked) if walked != node.depth => {
                            issues.push(AuditIssue::DepthMismatch {
                                node_id: node.id,
                                recorded: node.depth,
                                walked,
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
            None => issues.push(AuditIssue::MissingRootNode {
                node_id: root_node_id,
            }),
        }

        let distinct_users = tree
            .nodes()
            .map(|node| &node.acting_user)
            .collect::<std::collections::HashSet<_>>()
            .len();
        if distinct_users != tree.len() {
            issues.push(AuditIssue::RepeatedParticipant {
                nodes: tree.len(),
                distinct_users,
            });
        }

        TreeAudit {
            root_id,
            node_count: tree.len(),
            stored: tree.summary().clone(),
            rebuilt: Self::rebuild(root_id, tree.nodes()),
            issues,
        }
    }
}

// =============================================================================
// Audit
// =============================================================================

/// A broken tree invariant found by [`Aggregator::audit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditIssue {
    MissingRootNode { node_id: NodeId },
    RootHasParent { node_id: NodeId },
    ExtraRoot { node_id: NodeId },
    DanglingParent { node_id: NodeId, parent_id: NodeId },
    Cycle,
    Unreachable { node_id: NodeId },
    DepthMismatch { node_id: NodeId, recorded: u32, walked: u32 },
    RepeatedParticipant { nodes: usize, distinct_users: usize },
}

impl std::fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRootNode { node_id } => write!(f, "root node {} missing", node_id),
            Self::RootHasParent { node_id } => write!(f, "root node {} has a parent", node_id),
            Self::ExtraRoot { node_id } => write!(f, "node {} has no parent", node_id),
            Self::DanglingParent { node_id, parent_id } => {
                write!(f, "node {} points at missing parent {}", node_id, parent_id)
            }
            Self::Cycle => f.write_str("parent links form a cycle"),
            Self::Unreachable { node_id } => write!(f, "node {} unreachable from root", node_id),
            Self::DepthMismatch { node_id, recorded, walked } => write!(
                f,
                "node {} records depth {} but sits at depth {}",
                node_id, recorded, walked
            ),
            Self::RepeatedParticipant { nodes, distinct_users } => write!(
                f,
                "{} nodes for {} distinct users",
                nodes, distinct_users
            ),
        }
    }
}

/// Result of a full structural walk over one cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeAudit {
    pub root_id: RootId,
    pub node_count: usize,
    pub stored: CascadeSummary,
    pub rebuilt: CascadeSummary,
    pub issues: Vec<AuditIssue>,
}

impl TreeAudit {
    /// The nodes form one connected, acyclic tree with consistent depths.
    pub fn is_structurally_sound(&self) -> bool {
        self.issues.is_empty()
    }

    /// The stored summary agrees with a full recount.
    pub fn summary_matches(&self) -> bool {
        self.stored.same_aggregates(&self.rebuilt)
    }

    pub fn is_consistent(&self) -> bool {
        self.is_structurally_sound() && self.summary_matches()
    }

    pub fn issues_summary(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}
