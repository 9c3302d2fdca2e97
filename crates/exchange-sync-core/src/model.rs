//! Shared data model (spec.md §3 DATA MODEL).

use serde::{Deserialize, Serialize};

/// `(organization, id)` identity pair plus the opaque exchange credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub org: String,
    pub id: String,
    pub token: String,
}

impl Identity {
    pub fn display(&self) -> String {
        format!("{}/{}", self.org, self.id)
    }
}

/// The resource kind carried by a change-feed entry (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Message,
    Node,
    NodePolicy,
    NodeError,
    Service,
    Other(String),
}

impl Resource {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "message" => Resource::Message,
            "node" => Resource::Node,
            "nodePolicy" => Resource::NodePolicy,
            "nodeError" => Resource::NodeError,
            "service" => Resource::Service,
            other => Resource::Other(other.to_string()),
        }
    }
}

/// A single change-feed entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub resource: String,
    #[serde(rename = "orgID")]
    pub org_id: String,
    pub id: String,
    pub operation: String,
    pub change_id: u64,
}

impl Change {
    pub fn resource_kind(&self) -> Resource {
        Resource::from_wire(&self.resource)
    }

    /// spec.md §3: `isMessage(self) ⇔ resource=message ∧ id=self.id ∧ orgID=self.org`
    pub fn is_message(&self, me: &Identity) -> bool {
        self.resource_kind() == Resource::Message && self.matches_self(me)
    }

    pub fn is_node(&self, me: &Identity) -> bool {
        self.resource_kind() == Resource::Node && self.matches_self(me)
    }

    pub fn is_node_policy(&self, me: &Identity) -> bool {
        self.resource_kind() == Resource::NodePolicy && self.matches_self(me)
    }

    pub fn is_node_error(&self, me: &Identity) -> bool {
        self.resource_kind() == Resource::NodeError && self.matches_self(me)
    }

    /// spec.md §3: `isService() ⇔ resource=service` (any org/id).
    pub fn is_service(&self) -> bool {
        self.resource_kind() == Resource::Service
    }

    fn matches_self(&self, me: &Identity) -> bool {
        self.id == me.id && self.org_id == me.org
    }
}

/// The kinds of change that cause an internal bus event (spec.md §3, §4.F).
///
/// Ordered per spec.md §5: events within a tick are emitted in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Message,
    Node,
    NodePolicy,
    NodeError,
    Service,
}

impl ChangeKind {
    pub const ORDER: [ChangeKind; 5] = [
        ChangeKind::Message,
        ChangeKind::Node,
        ChangeKind::NodePolicy,
        ChangeKind::NodeError,
        ChangeKind::Service,
    ];

    /// Classifies `change`, returning `None` for uninteresting resources
    /// (spec.md §3: "anything else: uninteresting but still advances the
    /// cursor").
    pub fn classify(change: &Change, me: &Identity) -> Option<Self> {
        if change.is_message(me) {
            Some(ChangeKind::Message)
        } else if change.is_node(me) {
            Some(ChangeKind::Node)
        } else if change.is_node_policy(me) {
            Some(ChangeKind::NodePolicy)
        } else if change.is_node_error(me) {
            Some(ChangeKind::NodeError)
        } else if change.is_service() {
            Some(ChangeKind::Service)
        } else {
            None
        }
    }
}

/// Exchange-stored heartbeat/poll interval overrides (spec.md §3 PollState,
/// §6 "Node-stored heartbeat intervals").
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatIntervals {
    #[serde(default)]
    pub min_interval: u64,
    #[serde(default)]
    pub max_interval: u64,
    #[serde(default)]
    pub interval_adjustment: u64,
}

impl HeartbeatIntervals {
    pub fn is_unset(&self) -> bool {
        self.min_interval == 0 && self.max_interval == 0 && self.interval_adjustment == 0
    }
}

/// Organization metadata (spec.md §4.C `getOrganization`).
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub description: Option<String>,
}

/// An API-spec dependency declared by a workload definition (spec.md §3
/// Definitions, §4.C `resolveWorkload`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    pub spec_ref: String,
    pub org: String,
    pub version: String,
    pub arch: String,
}

/// A workload definition (spec.md §3 Definitions).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub url: String,
    pub org: String,
    pub version: String,
    pub arch: String,
    #[serde(default)]
    pub api_spec: Vec<ApiSpec>,
}

/// A microservice definition (spec.md §3 Definitions).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microservice {
    pub url: String,
    pub org: String,
    pub version: String,
    pub arch: String,
}

/// Opaque blockchain-client metadata (spec.md §4.C `getBlockchainClient`).
#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainClient {
    pub details: String,
}

/// A version or range requested by a caller of the Definition Lookup.
#[derive(Debug, Clone)]
pub enum VersionSelector {
    /// An exact version: exactly one matching record is expected.
    Exact(String),
    /// A range (or empty string): the highest in-range match is selected.
    Range(String),
}

impl VersionSelector {
    pub fn parse(s: &str) -> Self {
        if !s.is_empty() && crate::version::Range::is_version(s) {
            VersionSelector::Exact(s.to_string())
        } else {
            VersionSelector::Range(s.to_string())
        }
    }

    pub fn as_query_str(&self) -> &str {
        match self {
            VersionSelector::Exact(s) | VersionSelector::Range(s) => s,
        }
    }
}
