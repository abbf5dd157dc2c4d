//! Tree Builder: turns inbound events into validated store operations.
//!
//! Forward events are idempotent per (root, user): the first arrival inserts
//! a node and every later one, including the loser of a concurrent race,
//! gets that same node back with `replayed = true`.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::aggregator::SummaryRebuild;
use crate::cascade::{PropagationNode, RootId, ShareRoot};
use crate::error::{CascadeError, ErrorCode, Result};
use crate::events::{
    CascadeEvent, EngagementEvent, EventOutcome, ForwardEvent, ForwardOutcome, ShareEvent,
};
use crate::feed::SummaryFeed;
use crate::store::{NodeInsertion, PropagationStore};
use crate::telemetry::CascadeMetrics;

/// Label for `cascade_events_rejected_total`.
fn rejection_reason(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::RootNotFound => "root_not_found",
        ErrorCode::ParentNotFound => "parent_not_found",
        ErrorCode::NodeNotFound => "node_not_found",
        ErrorCode::DuplicateRoot => "duplicate_root",
        ErrorCode::DuplicateParticipant => "duplicate_participant",
        ErrorCode::ValidationError | ErrorCode::InvalidInput => "invalid",
        _ => "internal",
    }
}

fn rejected<T>(result: Result<T>) -> Result<T> {
    if let Err(ref err) = result {
        CascadeMetrics::event_rejected(rejection_reason(err.code()));
    }
    result
}

/// Applies share, forward and engagement events to a store.
#[derive(Clone)]
pub struct TreeBuilder {
    store: Arc<dyn PropagationStore>,
    feed: SummaryFeed,
}

impl TreeBuilder {
    pub fn new(store: Arc<dyn PropagationStore>, feed: SummaryFeed) -> Self {
        Self { store, feed }
    }

    pub fn store(&self) -> &Arc<dyn PropagationStore> {
        &self.store
    }

    pub fn feed(&self) -> &SummaryFeed {
        &self.feed
    }

    /// Start a cascade. A second share with the same candidate id fails with
    /// `DuplicateRoot`.
    #[instrument(skip(self, event), fields(origin_user = %event.origin_user))]
    pub fn share(&self, event: ShareEvent) -> Result<ShareRoot> {
        rejected(self.share_inner(event))
    }

    fn share_inner(&self, event: ShareEvent) -> Result<ShareRoot> {
        event.validate()?;
        let root = self
            .store
            .create_root(event.root_candidate_id, event.origin_user, event.content_ref)?;

        let summary = self.store.get_summary(root.id)?;
        self.feed.publish(summary, Some(root.root_node_id));
        Ok(root)
    }

    /// Record that `acting_user` received the content through `via_node_id`.
    #[instrument(
        skip(self, event),
        fields(root_id = %event.root_id, acting_user = %event.acting_user, via = %event.via_node_id)
    )]
    pub fn forward(&self, event: ForwardEvent) -> Result<ForwardOutcome> {
        rejected(self.forward_inner(event))
    }

    fn forward_inner(&self, event: ForwardEvent) -> Result<ForwardOutcome> {
        event.validate()?;
        let ForwardEvent {
            root_id,
            acting_user,
            via_node_id,
        } = event;

        self.store
            .get_node(root_id, via_node_id)
            .map_err(|err| match err.code() {
                ErrorCode::NodeNotFound => CascadeError::parent_not_found(root_id, via_node_id),
                _ => err,
            })?;

        if let Some(existing) = self.store.find_participant(root_id, &acting_user)? {
            return self.replayed(existing);
        }

        match self.store.append_node(root_id, acting_user.clone(), Some(via_node_id)) {
            Ok(NodeInsertion { node, summary }) => {
                self.feed.publish(summary.clone(), Some(node.id));
                Ok(ForwardOutcome {
                    node,
                    replayed: false,
                    summary,
                })
            }
            Err(err) if err.code() == ErrorCode::DuplicateParticipant => {
                // Lost the race to a concurrent forward for the same user.
                let existing = self
                    .store
                    .find_participant(root_id, &acting_user)?
                    .ok_or_else(|| {
                        CascadeError::invariant_violation(format!(
                            "user {} reported as duplicate in cascade {} but has no node",
                            acting_user, root_id
                        ))
                    })?;
                self.replayed(existing)
            }
            Err(err) => Err(err),
        }
    }

    fn replayed(&self, node: PropagationNode) -> Result<ForwardOutcome> {
        CascadeMetrics::forward_replayed();
        debug!(root_id = %node.root_id, node_id = %node.id, "Forward replayed, returning existing node");
        let summary = self.store.get_summary(node.root_id)?;
        Ok(ForwardOutcome {
            node,
            replayed: true,
            summary,
        })
    }

    /// Set an engagement flag on the user's node.
    #[instrument(
        skip(self, event),
        fields(root_id = %event.root_id, user_id = %event.user_id, action = %event.action)
    )]
    pub fn engage(&self, event: EngagementEvent) -> Result<PropagationNode> {
        rejected(self.engage_inner(event))
    }

    fn engage_inner(&self, event: EngagementEvent) -> Result<PropagationNode> {
        event.validate()?;
        let node = self.store.set_flag(event.root_id, &event.user_id, event.action)?;
        CascadeMetrics::engagement(event.action);
        Ok(node)
    }

    /// Replace the stored summary with a full recount and publish it.
    pub fn rebuild_summary(&self, root_id: RootId) -> Result<SummaryRebuild> {
        let rebuild = self.store.rebuild_summary(root_id)?;
        self.feed.publish_rebuild(rebuild.after.clone());
        Ok(rebuild)
    }

    /// Dispatch any inbound event.
    pub fn apply(&self, event: CascadeEvent) -> Result<EventOutcome> {
        let kind = event.kind();
        let outcome = match event {
            CascadeEvent::Share(event) => EventOutcome::RootCreated {
                root: self.share(event)?,
            },
            CascadeEvent::Forward(event) => EventOutcome::Forwarded(self.forward(event)?),
            CascadeEvent::Engagement(event) => EventOutcome::Engaged {
                node: self.engage(event)?,
            },
        };
        info!(kind, "Event applied");
        Ok(outcome)
    }
}
