//! Cascade inspection commands.
//!
//! Provides show, summary, frontier, position, path and list operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum TreeCommands {
    /// Show every node of a cascade
    Show {
        /// Root ID
        root_id: Uuid,
    },

    /// Show reach and depth of a cascade
    Summary {
        /// Root ID
        root_id: Uuid,
    },

    /// List the leaves of a cascade, newest first
    Frontier {
        /// Root ID
        root_id: Uuid,
    },

    /// Show where a user sits in a cascade
    Position {
        /// Root ID
        root_id: Uuid,
        /// User ID
        user: String,
    },

    /// Show the chain from the origin user to a user
    Path {
        /// Root ID
        root_id: Uuid,
        /// User ID
        user: String,
    },

    /// List all cascades
    List,
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct RootInfo {
    pub id: Uuid,
    pub origin_user: String,
    pub content_ref: String,
    pub root_node_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Flags {
    #[serde(default)]
    pub forwarded: bool,
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub dismissed: bool,
}

impl Flags {
    fn label(&self) -> String {
        let set: Vec<&str> = [
            (self.forwarded, "forwarded"),
            (self.saved, "saved"),
            (self.played, "played"),
            (self.dismissed, "dismissed"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();

        if set.is_empty() {
            "-".to_string()
        } else {
            set.join(",")
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NodeInfo {
    pub id: Uuid,
    pub root_id: Uuid,
    pub acting_user: String,
    pub parent_id: Option<Uuid>,
    pub depth: u32,
    #[serde(default)]
    pub flags: Flags,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SummaryInfo {
    pub root_id: Uuid,
    pub total_reach: u64,
    pub max_depth: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Tally {
    played: u64,
    saved: u64,
    forwarded: u64,
    dismissed: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct CascadeView {
    root: RootInfo,
    summary: SummaryInfo,
    #[serde(default)]
    engagement: Tally,
    nodes: Vec<NodeInfo>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Listing {
    root: RootInfo,
    summary: SummaryInfo,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Participation {
    Participating { node: NodeInfo },
    NotParticipating,
}

#[derive(Debug, Serialize, Tabled)]
pub struct NodeRow {
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Depth")]
    depth: u32,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Parent")]
    parent: String,
    #[tabled(rename = "Flags")]
    flags: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&NodeInfo> for NodeRow {
    fn from(node: &NodeInfo) -> Self {
        Self {
            user: output::indent(node.depth, &node.acting_user),
            depth: node.depth,
            node: output::short_id(&node.id.to_string()),
            parent: node
                .parent_id
                .map(|p| output::short_id(&p.to_string()))
                .unwrap_or_else(|| "-".to_string()),
            flags: node.flags.label(),
            created_at: output::timestamp(&node.created_at),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct ListingRow {
    #[tabled(rename = "Root")]
    id: String,
    #[tabled(rename = "Origin")]
    origin_user: String,
    #[tabled(rename = "Content")]
    content_ref: String,
    #[tabled(rename = "Reach")]
    total_reach: u64,
    #[tabled(rename = "Depth")]
    max_depth: u32,
    #[tabled(rename = "Created")]
    created_at: String,
}

/// Print a summary as key/value lines.
pub fn print_summary(summary: &SummaryInfo) {
    output::print_detail("Root", &summary.root_id.to_string());
    output::print_detail("Total reach", &summary.total_reach.to_string());
    output::print_detail("Max depth", &summary.max_depth.to_string());
    output::print_detail("Updated", &output::timestamp(&summary.updated_at));
}

fn rows(nodes: &[NodeInfo]) -> Vec<NodeRow> {
    nodes.iter().map(NodeRow::from).collect()
}

pub async fn execute(cmd: TreeCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        TreeCommands::Show { root_id } => {
            let view: CascadeView = client.get(&format!("/api/v1/cascades/{}", root_id)).await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Cascade {}", view.root.id));
                    output::print_detail("Origin", &view.root.origin_user);
                    output::print_detail("Content", &view.root.content_ref);
                    print_summary(&view.summary);
                    output::print_detail(
                        "Engagement",
                        &format!(
                            "played {} / saved {} / forwarded {} / dismissed {}",
                            view.engagement.played,
                            view.engagement.saved,
                            view.engagement.forwarded,
                            view.engagement.dismissed
                        ),
                    );
                    println!();
                    output::print_list(&rows(&view.nodes), format)?;
                }
                _ => output::print_item(&view, format)?,
            }
        }

        TreeCommands::Summary { root_id } => {
            let summary: SummaryInfo = client
                .get(&format!("/api/v1/cascades/{}/summary", root_id))
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_header("Cascade Summary");
                    print_summary(&summary);
                }
                _ => output::print_item(&summary, format)?,
            }
        }

        TreeCommands::Frontier { root_id } => {
            let nodes: Vec<NodeInfo> = client
                .get(&format!("/api/v1/cascades/{}/frontier", root_id))
                .await?;

            match format {
                OutputFormat::Table => output::print_list(&rows(&nodes), format)?,
                _ => output::print_item(&nodes, format)?,
            }
        }

        TreeCommands::Position { root_id, user } => {
            let position: Participation = client
                .get(&format!("/api/v1/cascades/{}/users/{}", root_id, user))
                .await?;

            match (format, &position) {
                (OutputFormat::Table, Participation::Participating { node }) => {
                    output::print_header(&format!("{} in cascade {}", user, root_id));
                    output::print_detail("Node", &node.id.to_string());
                    output::print_detail("Depth", &node.depth.to_string());
                    output::print_detail(
                        "Parent",
                        &node.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                    );
                    output::print_detail("Flags", &node.flags.label());
                }
                (OutputFormat::Table, Participation::NotParticipating) => {
                    output::print_info(&format!("{} does not participate in cascade {}", user, root_id));
                }
                _ => output::print_item(&position, format)?,
            }
        }

        TreeCommands::Path { root_id, user } => {
            let path: Vec<NodeInfo> = client
                .get(&format!("/api/v1/cascades/{}/users/{}/path", root_id, user))
                .await?;

            match format {
                OutputFormat::Table => {
                    let chain: Vec<&str> = path.iter().map(|n| n.acting_user.as_str()).collect();
                    println!("{}", chain.join(" -> "));
                }
                _ => output::print_item(&path, format)?,
            }
        }

        TreeCommands::List => {
            let listing: Vec<Listing> = client.get("/api/v1/cascades").await?;

            match format {
                OutputFormat::Table => {
                    let rows: Vec<ListingRow> = listing
                        .iter()
                        .map(|l| ListingRow {
                            id: l.root.id.to_string(),
                            origin_user: l.root.origin_user.clone(),
                            content_ref: l.root.content_ref.clone(),
                            total_reach: l.summary.total_reach,
                            max_depth: l.summary.max_depth,
                            created_at: output::timestamp(&l.root.created_at),
                        })
                        .collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&listing, format)?,
            }
        }
    }

    Ok(())
}
