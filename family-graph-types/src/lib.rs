//! Shared types for the family graph service and its RPC clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Domain Enums
// =====================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            "unknown" => Some(Gender::Unknown),
            _ => None,
        }
    }
}

/// Where a person node came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonSource {
    /// Typed in by a tree editor
    Manual,
    /// Represents a real platform account (self nodes and approval mirrors)
    PlatformUser,
}

impl PersonSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonSource::Manual => "manual",
            PersonSource::PlatformUser => "platform_user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(PersonSource::Manual),
            "platform_user" => Some(PersonSource::PlatformUser),
            _ => None,
        }
    }
}

/// Confirmation state of a person's cross-account link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    None,
    Pending,
    Confirmed,
    Unlinked,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::None => "none",
            LinkStatus::Pending => "pending",
            LinkStatus::Confirmed => "confirmed",
            LinkStatus::Unlinked => "unlinked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(LinkStatus::None),
            "pending" => Some(LinkStatus::Pending),
            "confirmed" => Some(LinkStatus::Confirmed),
            "unlinked" => Some(LinkStatus::Unlinked),
            _ => None,
        }
    }
}

/// Edge type. An edge `(p1, p2, T)` reads "p1 is the T of p2".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Parent,
    Child,
    Spouse,
    Sibling,
    HalfSibling,
    StepParent,
    StepChild,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Parent => "parent",
            RelationshipType::Child => "child",
            RelationshipType::Spouse => "spouse",
            RelationshipType::Sibling => "sibling",
            RelationshipType::HalfSibling => "half_sibling",
            RelationshipType::StepParent => "step_parent",
            RelationshipType::StepChild => "step_child",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "parent" => Some(RelationshipType::Parent),
            "child" => Some(RelationshipType::Child),
            "spouse" => Some(RelationshipType::Spouse),
            "sibling" => Some(RelationshipType::Sibling),
            "half_sibling" => Some(RelationshipType::HalfSibling),
            "step_parent" => Some(RelationshipType::StepParent),
            "step_child" => Some(RelationshipType::StepChild),
            _ => None,
        }
    }

    /// The same fact seen from the other person: `(a, b, T)` == `(b, a, T.inverse())`.
    pub fn inverse(&self) -> Self {
        match self {
            RelationshipType::Parent => RelationshipType::Child,
            RelationshipType::Child => RelationshipType::Parent,
            RelationshipType::StepParent => RelationshipType::StepChild,
            RelationshipType::StepChild => RelationshipType::StepParent,
            other => *other,
        }
    }

    /// Directed types take part in the inverse-pair cycle check.
    pub fn is_directed(&self) -> bool {
        self.inverse() != *self
    }
}

/// Access role on a tree, ordered viewer < member < owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeRole {
    Viewer,
    Member,
    Owner,
}

impl TreeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeRole::Viewer => "viewer",
            TreeRole::Member => "member",
            TreeRole::Owner => "owner",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "viewer" => Some(TreeRole::Viewer),
            "member" | "editor" => Some(TreeRole::Member),
            "owner" => Some(TreeRole::Owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingLinkStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl PendingLinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingLinkStatus::Pending => "pending",
            PendingLinkStatus::Approved => "approved",
            PendingLinkStatus::Rejected => "rejected",
            PendingLinkStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PendingLinkStatus::Pending),
            "approved" => Some(PendingLinkStatus::Approved),
            "rejected" => Some(PendingLinkStatus::Rejected),
            "expired" => Some(PendingLinkStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PendingLinkStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Family,
    Friend,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Family => "family",
            ConnectionKind::Friend => "friend",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "family" => Some(ConnectionKind::Family),
            "friend" => Some(ConnectionKind::Friend),
            _ => None,
        }
    }
}

// =====================================================
// Domain Types
// =====================================================

/// A node in exactly one owning tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub tree_id: String,
    pub first_name: String,
    pub last_name: String,
    pub maiden_name: Option<String>,
    pub gender: Gender,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub is_alive: bool,
    pub linked_user_id: Option<String>,
    pub link_status: LinkStatus,
    pub source: PersonSource,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// True for the node representing the tree owner themselves.
    pub fn is_self_node(&self) -> bool {
        self.linked_user_id.as_deref() == Some(self.tree_id.as_str())
    }

    /// Linked account this node resolves to in another tree, once confirmed.
    pub fn confirmed_foreign_link(&self) -> Option<&str> {
        match (&self.linked_user_id, self.link_status) {
            (Some(uid), LinkStatus::Confirmed) if uid != &self.tree_id => Some(uid.as_str()),
            _ => None,
        }
    }
}

/// A directed, typed edge scoped to one tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub tree_id: String,
    pub person1_id: i64,
    pub person2_id: i64,
    pub relationship_type: RelationshipType,
    pub is_biological: bool,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeMembership {
    pub tree_id: String,
    pub user_id: String,
    pub role: TreeRole,
    pub joined_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLink {
    pub id: i64,
    pub tree_id: String,
    pub person_id: i64,
    pub target_user_id: Option<String>,
    pub target_email: Option<String>,
    pub token: String,
    pub status: PendingLinkStatus,
    pub created_by: String,
    pub created_at: String,
    pub expires_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: i64,
    pub user_id: String,
    pub peer_user_id: String,
    pub kind: ConnectionKind,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: String,
}

// =====================================================
// Traversal View
// =====================================================

/// Why a node was not expanded into its linked account's tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StubReason {
    /// Caller has no membership on the linked account's tree
    Inaccessible,
    /// Linked account has no self node in its own tree
    Unresolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub person: Person,
    /// Signed offset from the root: negative for ancestors, positive for descendants
    pub generation: i32,
    /// Every tree this individual was resolved in, in visit order
    pub resolved_trees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub: Option<StubReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEdge {
    pub from_person_id: i64,
    pub to_person_id: i64,
    pub relationship_type: RelationshipType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeView {
    pub tree_id: String,
    pub max_depth: u32,
    pub root: TreeNode,
    pub ancestors: Vec<TreeNode>,
    pub descendants: Vec<TreeNode>,
    pub spouses: Vec<TreeNode>,
    pub edges: Vec<TreeEdge>,
}

// =====================================================
// Request Types
// =====================================================

/// Relationship between a person being added and an existing one.
///
/// `person_id` is an opaque id string, or `"self"` for the tree's self node.
/// The new person is the `relationship_type` of `person_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub person_id: String,
    pub relationship_type: RelationshipType,
    #[serde(default = "default_true")]
    pub is_biological: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddPersonRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub maiden_name: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub death_date: Option<String>,
    #[serde(default)]
    pub is_alive: Option<bool>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
    #[serde(default)]
    pub linked_user_id: Option<String>,
    #[serde(default)]
    pub invite_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePersonRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub maiden_name: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub is_alive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelationshipRequest {
    pub person1_id: String,
    pub person2_id: String,
    pub relationship_type: RelationshipType,
    #[serde(default = "default_true")]
    pub is_biological: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantMembershipRequest {
    pub user_id: String,
    pub role: TreeRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub peer_user_id: String,
    pub kind: ConnectionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertProfileRequest {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

// =====================================================
// Response Types
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPersonResponse {
    pub person: Person,
    pub relationships: Vec<Relationship>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_link: Option<PendingLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDecision {
    pub link: PendingLink,
    /// Person representing the requester in the approver's tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrored_person_id: Option<i64>,
    pub mirrored_relationships: usize,
    /// True when approve() replayed an already approved link
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub total_persons: i64,
    pub total_relationships: i64,
    pub pending_links: i64,
}

/// Generic RPC response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
