//! Outbound feed of summary updates.
//!
//! Every successful insert publishes the cascade's new summary. Consumers
//! (analytics, notification triggers, the SSE endpoint) subscribe to a
//! broadcast channel; a slow consumer lags and skips updates instead of
//! back-pressuring writers.
//!
//! Per root, published reach never goes down in sequence order. Writers
//! capture summaries under the cascade lock but publish after releasing it,
//! so an update can reach the feed behind a newer one for the same root; such
//! stale updates are dropped. Rebuilds are authoritative and always go out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::cascade::{CascadeSummary, NodeId, RootId};
use crate::telemetry::CascadeMetrics;

/// One summary change, stamped with a feed-wide sequence number that is
/// unique and increases per root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryUpdate {
    pub sequence: u64,
    pub root_id: RootId,

    /// Node whose insert caused the change; `None` for rebuilds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,

    pub summary: CascadeSummary,
    pub published_at: DateTime<Utc>,
}

/// Broadcast channel of [`SummaryUpdate`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SummaryFeed {
    sender: broadcast::Sender<SummaryUpdate>,
    sequence: Arc<AtomicU64>,
    /// Highest reach published per root.
    published_reach: Arc<DashMap<RootId, u64>>,
}

impl SummaryFeed {
    /// Create a feed buffering up to `capacity` updates per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
            published_reach: Arc::new(DashMap::new()),
        }
    }

    /// Publish the summary captured by an insert. Returns how many
    /// subscribers received it; 0 when the update was stale.
    pub fn publish(&self, summary: CascadeSummary, node_id: Option<NodeId>) -> usize {
        self.send(summary, node_id, false)
    }

    /// Publish a rebuilt summary, even if its reach is below what was
    /// published before.
    pub fn publish_rebuild(&self, summary: CascadeSummary) -> usize {
        self.send(summary, None, true)
    }

    fn send(&self, summary: CascadeSummary, node_id: Option<NodeId>, rebuild: bool) -> usize {
        // The entry guard serializes sequencing and sending per root.
        let mut reach = self.published_reach.entry(summary.root_id).or_insert(0);
        if !rebuild && summary.total_reach < *reach {
            CascadeMetrics::feed_update_dropped();
            trace!(
                root_id = %summary.root_id,
                stale_reach = summary.total_reach,
                published_reach = *reach,
                "Stale summary update dropped"
            );
            return 0;
        }
        *reach = summary.total_reach;

        let update = SummaryUpdate {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            root_id: summary.root_id,
            node_id,
            summary,
            published_at: Utc::now(),
        };

        // An error only means nobody is listening.
        let delivered = self.sender.send(update).unwrap_or(0);
        trace!(delivered, "Summary update published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SummaryUpdate> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SummaryFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
