//! Cascade data model: share roots, propagation nodes and the per-root tree.
//!
//! This module handles:
//! - Identifiers for roots, nodes, users and content
//! - The arena-backed propagation tree of a single share root
//! - The derived per-root summary and engagement tally

mod node;
mod summary;
mod tree;

pub use node::{
    ContentRef, EngagementAction, NodeFlags, NodeId, PropagationNode, RootId, ShareRoot, UserId,
};
pub use summary::{CascadeSummary, EngagementTally};
pub use tree::{new_share_root, CascadeRecord, CascadeTree};
