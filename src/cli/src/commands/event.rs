//! Event ingress commands.
//!
//! Posts share, forward and engagement events to the server.

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tree::{print_summary, NodeInfo, NodeRow, RootInfo, SummaryInfo};
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum EventCommands {
    /// Start a cascade: a user shares content for the first time
    Share {
        /// Sharing user
        user: String,

        /// Reference of the shared content
        content: String,

        /// Use this root ID instead of a generated one
        #[arg(long)]
        root_id: Option<Uuid>,
    },

    /// Record that a user received the content through an existing node
    Forward {
        /// Root ID
        root_id: Uuid,

        /// Receiving user
        user: String,

        /// Node the content arrived through
        #[arg(long)]
        via: Uuid,
    },

    /// Record what a participant did with the content
    Engage {
        /// Root ID
        root_id: Uuid,

        /// Participating user
        user: String,

        /// Engagement action
        #[arg(value_enum)]
        action: Action,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Played,
    Saved,
    Forwarded,
    Dismissed,
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ShareRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    root_candidate_id: Option<Uuid>,
    origin_user: String,
    content_ref: String,
}

#[derive(Serialize)]
struct ForwardRequest {
    acting_user: String,
    via_node_id: Uuid,
}

#[derive(Serialize)]
struct EngagementRequest {
    user_id: String,
    action: Action,
}

#[derive(Debug, Deserialize, Serialize)]
struct ForwardOutcome {
    node: NodeInfo,
    replayed: bool,
    summary: SummaryInfo,
}

pub async fn execute(cmd: EventCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        EventCommands::Share {
            user,
            content,
            root_id,
        } => {
            let req = ShareRequest {
                root_candidate_id: root_id,
                origin_user: user,
                content_ref: content,
            };
            let root: RootInfo = client.post("/api/v1/shares", &req).await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Cascade started: {}", root.id));
                    output::print_detail("Root node", &root.root_node_id.to_string());
                    output::print_detail("Origin", &root.origin_user);
                    output::print_detail("Content", &root.content_ref);
                }
                _ => output::print_item(&root, format)?,
            }
        }

        EventCommands::Forward { root_id, user, via } => {
            let req = ForwardRequest {
                acting_user: user,
                via_node_id: via,
            };
            let outcome: ForwardOutcome = client
                .post(&format!("/api/v1/cascades/{}/forwards", root_id), &req)
                .await?;

            match format {
                OutputFormat::Table => {
                    if outcome.replayed {
                        output::print_info(&format!(
                            "{} already participates; existing node returned",
                            outcome.node.acting_user
                        ));
                    } else {
                        output::print_success(&format!(
                            "{} joined at depth {}",
                            outcome.node.acting_user, outcome.node.depth
                        ));
                    }
                    output::print_list(&[NodeRow::from(&outcome.node)], format)?;
                    print_summary(&outcome.summary);
                }
                _ => output::print_item(&outcome, format)?,
            }
        }

        EventCommands::Engage {
            root_id,
            user,
            action,
        } => {
            let req = EngagementRequest {
                user_id: user,
                action,
            };
            let node: NodeInfo = client
                .post(&format!("/api/v1/cascades/{}/engagements", root_id), &req)
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("{:?} recorded for {}", action, node.acting_user));
                    output::print_list(&[NodeRow::from(&node)], format)?;
                }
                _ => output::print_item(&node, format)?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_request_omits_missing_root() {
        let req = ShareRequest {
            root_candidate_id: None,
            origin_user: "alice".into(),
            content_ref: "track".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("root_candidate_id").is_none());
    }

    #[test]
    fn test_action_wire_name() {
        let req = EngagementRequest {
            user_id: "bob".into(),
            action: Action::Dismissed,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "dismissed");
    }
}
