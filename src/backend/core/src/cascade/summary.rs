//! Derived per-cascade records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::RootId;

/// Running aggregates of one cascade. Owned by its share root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSummary {
    pub root_id: RootId,

    /// Number of nodes, root included
    pub total_reach: u64,

    /// Deepest depth across all nodes
    pub max_depth: u32,

    /// When the last node was counted
    pub updated_at: DateTime<Utc>,
}

impl CascadeSummary {
    /// A summary that has counted nothing yet.
    pub fn empty(root_id: RootId) -> Self {
        Self {
            root_id,
            total_reach: 0,
            max_depth: 0,
            updated_at: Utc::now(),
        }
    }

    /// Reach and depth only; `updated_at` is bookkeeping.
    pub fn same_aggregates(&self, other: &CascadeSummary) -> bool {
        self.root_id == other.root_id
            && self.total_reach == other.total_reach
            && self.max_depth == other.max_depth
    }
}

/// How many participants set each engagement flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementTally {
    pub played: u64,
    pub saved: u64,
    pub forwarded: u64,
    pub dismissed: u64,
}
