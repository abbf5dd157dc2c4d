//! Share roots, propagation nodes and their identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a share root (one cascade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootId(pub Uuid);

impl RootId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RootId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RootId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a propagation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a user, as issued by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to the shared content (a track identifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef(pub String);

impl ContentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentRef {
    fn from(reference: &str) -> Self {
        Self(reference.to_string())
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The origin of a cascade. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRoot {
    /// Unique identifier
    pub id: RootId,

    /// User who shared the content first
    pub origin_user: UserId,

    /// What was shared
    pub content_ref: ContentRef,

    /// Node the origin user occupies at depth 0; the first forwards hang off it
    pub root_node_id: NodeId,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// What a participant did with the content after receiving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementAction {
    Played,
    Saved,
    Forwarded,
    Dismissed,
}

impl EngagementAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Played => "played",
            Self::Saved => "saved",
            Self::Forwarded => "forwarded",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for EngagementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngagementAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "played" | "play" => Ok(Self::Played),
            "saved" | "save" => Ok(Self::Saved),
            "forwarded" | "forward" => Ok(Self::Forwarded),
            "dismissed" | "dismiss" => Ok(Self::Dismissed),
            other => Err(format!("unknown engagement action: {}", other)),
        }
    }
}

/// Independent engagement flags of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    #[serde(default)]
    pub forwarded: bool,
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub dismissed: bool,
}

impl NodeFlags {
    /// Set the flag matching `action`. Returns `true` if the flag changed.
    pub fn set(&mut self, action: EngagementAction) -> bool {
        let flag = match action {
            EngagementAction::Played => &mut self.played,
            EngagementAction::Saved => &mut self.saved,
            EngagementAction::Forwarded => &mut self.forwarded,
            EngagementAction::Dismissed => &mut self.dismissed,
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    pub fn is_set(&self, action: EngagementAction) -> bool {
        match action {
            EngagementAction::Played => self.played,
            EngagementAction::Saved => self.saved,
            EngagementAction::Forwarded => self.forwarded,
            EngagementAction::Dismissed => self.dismissed,
        }
    }
}

/// One hop in a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationNode {
    /// Unique identifier
    pub id: NodeId,

    /// Cascade this node belongs to
    pub root_id: RootId,

    /// User occupying this position
    pub acting_user: UserId,

    /// Node this one was reached through (`None` only for the root node)
    pub parent_id: Option<NodeId>,

    /// Forwarding hops from the root node
    pub depth: u32,

    /// Engagement flags
    #[serde(default)]
    pub flags: NodeFlags,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl PropagationNode {
    pub(crate) fn root(root_id: RootId, id: NodeId, origin_user: UserId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            root_id,
            acting_user: origin_user,
            parent_id: None,
            depth: 0,
            flags: NodeFlags::default(),
            created_at: at,
        }
    }

    pub(crate) fn child_of(parent: &PropagationNode, acting_user: UserId) -> Self {
        Self {
            id: NodeId::new(),
            root_id: parent.root_id,
            acting_user,
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
            flags: NodeFlags::default(),
            created_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
