//! The `TransferProcess` data model (spec.md §3).
//!
//! Cross-links inside a process are ids, not shared pointers — the
//! manifest is keyed by definition id, the provisioned set by resource
//! id, per the "cyclic/shared ownership" design note. Polymorphic
//! resources are a tagged enum rather than a trait object hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the transfer this process represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferProcessKind {
    Consumer,
    Provider,
}

/// The stable, storable state codes from spec.md §3.
///
/// `as_code`/`from_code` give any store implementation a persistence-
/// neutral integer to round-trip, per spec.md §6 ("the core requires
/// only that reads and writes round-trip faithfully").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferProcessState {
    Initial,
    Provisioning,
    Provisioned,
    Requesting,
    Requested,
    InProgress,
    Streaming,
    Completed,
    Deprovisioning,
    Deprovisioned,
    Ended,
    Error,
}

impl TransferProcessState {
    pub fn as_code(self) -> i32 {
        match self {
            Self::Initial => 0,
            Self::Provisioning => 100,
            Self::Provisioned => 200,
            Self::Requesting => 300,
            Self::Requested => 400,
            Self::InProgress => 500,
            Self::Streaming => 550,
            Self::Completed => 600,
            Self::Deprovisioning => 700,
            Self::Deprovisioned => 800,
            Self::Ended => 900,
            Self::Error => -1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Initial,
            100 => Self::Provisioning,
            200 => Self::Provisioned,
            300 => Self::Requesting,
            400 => Self::Requested,
            500 => Self::InProgress,
            550 => Self::Streaming,
            600 => Self::Completed,
            700 => Self::Deprovisioning,
            800 => Self::Deprovisioned,
            900 => Self::Ended,
            -1 => Self::Error,
            _ => return None,
        })
    }

    /// `ERROR` and `ENDED` are absorbing (spec.md §3 invariants).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Ended)
    }
}

/// The states the scheduler loop polls `nextForState` against each tick
/// (spec.md §4.2 step 2). Order is significant: it is the fixed dispatch
/// order for a single tick.
pub const ACTIVE_STATES: [TransferProcessState; 9] = [
    TransferProcessState::Initial,
    TransferProcessState::Provisioning,
    TransferProcessState::Provisioned,
    TransferProcessState::Requesting,
    TransferProcessState::Requested,
    TransferProcessState::InProgress,
    TransferProcessState::Streaming,
    TransferProcessState::Deprovisioning,
    TransferProcessState::Deprovisioned,
];

/// `transferType` from spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferType {
    pub is_finite: bool,
}

/// The immutable request that spawned a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequest {
    /// The transfer id — distinct from the process id, used for
    /// idempotency (spec.md §4.4).
    pub id: String,
    pub destination_type: String,
    pub transfer_type: TransferType,
    pub managed_resources: bool,
    /// Opaque to the scheduler: connector/protocol identifier, used only
    /// as a dispatch key by `RemoteMessageDispatcherRegistry`.
    pub protocol: String,
    /// Opaque connector descriptor.
    pub connector_id: String,
    /// Opaque destination descriptor.
    pub destination: serde_json::Value,
}

/// One entry of a `ResourceManifest` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub id: String,
    pub resource_type: String,
}

/// Ordered set of `ResourceDefinition`s, fixed once assigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceManifest {
    pub definitions: Vec<ResourceDefinition>,
}

impl ResourceManifest {
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// A concrete, externally-allocated endpoint attached to a process.
///
/// The `Destination` variant is the only capability the scheduler needs
/// beyond the common fields: the `isDestination` predicate and the
/// `resourceType` selector (design note in spec.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProvisionedResource {
    Standard {
        id: String,
        resource_definition_id: String,
        resource_type: String,
    },
    Destination {
        id: String,
        resource_definition_id: String,
        resource_type: String,
    },
}

impl ProvisionedResource {
    pub fn id(&self) -> &str {
        match self {
            Self::Standard { id, .. } | Self::Destination { id, .. } => id,
        }
    }

    pub fn resource_definition_id(&self) -> &str {
        match self {
            Self::Standard {
                resource_definition_id,
                ..
            }
            | Self::Destination {
                resource_definition_id,
                ..
            } => resource_definition_id,
        }
    }

    pub fn resource_type(&self) -> &str {
        match self {
            Self::Standard { resource_type, .. } | Self::Destination { resource_type, .. } => {
                resource_type
            }
        }
    }

    pub fn is_destination(&self) -> bool {
        matches!(self, Self::Destination { .. })
    }
}

/// Ordered set of `ProvisionedResource`s, keyed by resource id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionedResourceSet {
    pub resources: Vec<ProvisionedResource>,
}

impl ProvisionedResourceSet {
    pub fn has_destination_resource(&self) -> bool {
        self.resources.iter().any(|r| r.is_destination())
    }
}

/// The unit of work (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProcess {
    pub id: String,
    pub kind: TransferProcessKind,
    pub state: TransferProcessState,
    pub data_request: DataRequest,
    pub resource_manifest: ResourceManifest,
    pub provisioned_resource_set: ProvisionedResourceSet,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferProcess {
    /// Construct a new process in `INITIAL`, per `initiate*Request`
    /// (spec.md §4.4 step 3).
    pub fn new(kind: TransferProcessKind, data_request: DataRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            state: TransferProcessState::Initial,
            data_request,
            resource_manifest: ResourceManifest::default(),
            provisioned_resource_set: ProvisionedResourceSet::default(),
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transfer_id(&self) -> &str {
        &self.data_request.id
    }

    /// A process with `managedResources=true` cannot complete until every
    /// provisioned resource's checker reports done; a process with
    /// `managedResources=false` completes as soon as one destination
    /// resource exists and its checker (if any) reports done
    /// (spec.md §3 invariants).
    pub fn managed_resources(&self) -> bool {
        self.data_request.managed_resources
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
