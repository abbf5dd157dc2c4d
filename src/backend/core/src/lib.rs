#![allow(clippy::result_large_err)]
//! # Cascade Core
//!
//! Tracks how shared content spreads from user to user.
//!
//! ## Architecture
//!
//! - **Propagation Store**: Per-root propagation trees with atomic summary updates
//! - **Tree Builder**: Validates share, forward and engagement events and applies them idempotently
//! - **Aggregator**: Incremental and full-recount reach/depth aggregates, plus structural audits
//! - **Query Service**: Read-only projections (cascade, position, frontier, path)
//! - **Summary Feed**: Broadcast of summary updates, exposed over server-sent events
//! - **Telemetry**: Structured logging and Prometheus metrics

pub mod aggregator;
pub mod api;
pub mod builder;
pub mod cascade;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod query;
pub mod store;
pub mod telemetry;

pub use error::{CascadeError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::aggregator::{Aggregate, Aggregator, AuditIssue, SummaryRebuild, TreeAudit};
    pub use crate::builder::TreeBuilder;
    pub use crate::cascade::{
        CascadeRecord, CascadeSummary, CascadeTree, ContentRef, EngagementAction, EngagementTally,
        NodeFlags, NodeId, PropagationNode, RootId, ShareRoot, UserId,
    };
    pub use crate::error::{CascadeError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};
    pub use crate::events::{
        CascadeEvent, EngagementEvent, EventOutcome, ForwardEvent, ForwardOutcome, ShareEvent,
    };
    pub use crate::feed::{SummaryFeed, SummaryUpdate};
    pub use crate::query::{CascadeListing, CascadeQueryService, CascadeView, Participation};
    pub use crate::store::{MemoryStore, NodeInsertion, PropagationStore, SnapshotFile, StoreSnapshot};
}
