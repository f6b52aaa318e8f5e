//! External registries the scheduler consumes (spec.md §6, §9).
//!
//! "Registries as lookup tables" (spec.md §9): `ProvisionManager`,
//! `StatusCheckerRegistry`, `DataFlowManager`, and
//! `RemoteMessageDispatcherRegistry` are all resource-kind → handler
//! maps. They're implemented here as plain keyed dispatch tables
//! (`HashMap<String, Arc<dyn _>>`), not inheritance hierarchies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::CollaboratorError;
use crate::process::{
    DataRequest, ProvisionedResource, ResourceDefinition, ResourceManifest, TransferProcess,
};

/// One provisioner response: a resource plus (unused by the scheduler,
/// opaque) secret material.
#[derive(Debug, Clone)]
pub struct ProvisionResponse {
    pub resource: ProvisionedResource,
}

#[derive(Debug, Clone)]
pub struct DeprovisionResponse {
    pub resource_id: String,
}

/// Per-resource-type provisioning logic, looked up by `ResourceDefinition::resource_type`.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    async fn provision_one(
        &self,
        process: &TransferProcess,
        definition: &ResourceDefinition,
    ) -> Result<ProvisionResponse, CollaboratorError>;

    async fn deprovision_one(
        &self,
        process: &TransferProcess,
        resource: &ProvisionedResource,
    ) -> Result<DeprovisionResponse, CollaboratorError>;
}

/// `ProvisionManager.provision` / `.deprovision` (spec.md §6).
#[async_trait]
pub trait ProvisionManager: Send + Sync {
    async fn provision(
        &self,
        process: &TransferProcess,
    ) -> Result<Vec<ProvisionResponse>, CollaboratorError>;

    async fn deprovision(
        &self,
        process: &TransferProcess,
    ) -> Result<Vec<DeprovisionResponse>, CollaboratorError>;
}

/// Keyed dispatch table mapping resource type to `ResourceProvisioner`.
#[derive(Default)]
pub struct KeyedProvisionManager {
    provisioners: HashMap<String, Arc<dyn ResourceProvisioner>>,
}

impl std::fmt::Debug for KeyedProvisionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedProvisionManager")
            .field("resource_types", &self.provisioners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyedProvisionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_type: impl Into<String>, provisioner: Arc<dyn ResourceProvisioner>) {
        self.provisioners.insert(resource_type.into(), provisioner);
    }
}

#[async_trait]
impl ProvisionManager for KeyedProvisionManager {
    async fn provision(
        &self,
        process: &TransferProcess,
    ) -> Result<Vec<ProvisionResponse>, CollaboratorError> {
        let futures = process
            .resource_manifest
            .definitions
            .iter()
            .map(|definition| async move {
                let provisioner = self.provisioners.get(&definition.resource_type).ok_or_else(|| {
                    CollaboratorError::Provision {
                        reason: format!("no provisioner registered for resource type {}", definition.resource_type),
                    }
                })?;
                provisioner.provision_one(process, definition).await
            });
        join_all(futures).await.into_iter().collect()
    }

    async fn deprovision(
        &self,
        process: &TransferProcess,
    ) -> Result<Vec<DeprovisionResponse>, CollaboratorError> {
        let futures = process
            .provisioned_resource_set
            .resources
            .iter()
            .map(|resource| async move {
                let provisioner = self.provisioners.get(resource.resource_type()).ok_or_else(|| {
                    CollaboratorError::Provision {
                        reason: format!("no provisioner registered for resource type {}", resource.resource_type()),
                    }
                })?;
                provisioner.deprovision_one(process, resource).await
            });
        join_all(futures).await.into_iter().collect()
    }
}

/// `DataFlowManager.initiate` (spec.md §6).
pub enum DataFlowResult {
    Success { endpoint_ref: String },
    Failure { error_detail: String },
}

#[async_trait]
pub trait DataFlowManager: Send + Sync {
    async fn initiate(&self, process: &TransferProcess) -> DataFlowResult;
}

/// `StatusCheckerRegistry.resolve` (spec.md §6).
pub trait StatusChecker: Send + Sync {
    fn is_complete(&self, process: &TransferProcess, resource: &ProvisionedResource) -> bool;
}

pub trait StatusCheckerRegistry: Send + Sync {
    fn resolve(&self, resource_type: &str) -> Option<Arc<dyn StatusChecker>>;
}

#[derive(Default)]
pub struct KeyedStatusCheckerRegistry {
    checkers: HashMap<String, Arc<dyn StatusChecker>>,
}

impl std::fmt::Debug for KeyedStatusCheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStatusCheckerRegistry")
            .field("resource_types", &self.checkers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyedStatusCheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_type: impl Into<String>, checker: Arc<dyn StatusChecker>) {
        self.checkers.insert(resource_type.into(), checker);
    }
}

impl StatusCheckerRegistry for KeyedStatusCheckerRegistry {
    fn resolve(&self, resource_type: &str) -> Option<Arc<dyn StatusChecker>> {
        self.checkers.get(resource_type).cloned()
    }
}

/// `RemoteMessageDispatcherRegistry.send` (spec.md §6), simplified to an
/// ack/fail outcome — the scheduler only needs to know whether the
/// `DataRequest` was accepted, not the wire response shape.
#[async_trait]
pub trait RemoteMessageDispatcher: Send + Sync {
    async fn send(&self, message: &DataRequest) -> Result<(), CollaboratorError>;
}

pub trait RemoteMessageDispatcherRegistry: Send + Sync {
    fn dispatcher_for(&self, protocol: &str) -> Option<Arc<dyn RemoteMessageDispatcher>>;
}

#[derive(Default)]
pub struct KeyedDispatcherRegistry {
    dispatchers: HashMap<String, Arc<dyn RemoteMessageDispatcher>>,
}

impl std::fmt::Debug for KeyedDispatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedDispatcherRegistry")
            .field("protocols", &self.dispatchers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyedDispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, protocol: impl Into<String>, dispatcher: Arc<dyn RemoteMessageDispatcher>) {
        self.dispatchers.insert(protocol.into(), dispatcher);
    }
}

impl RemoteMessageDispatcherRegistry for KeyedDispatcherRegistry {
    fn dispatcher_for(&self, protocol: &str) -> Option<Arc<dyn RemoteMessageDispatcher>> {
        self.dispatchers.get(protocol).cloned()
    }
}

/// `ResourceManifestGenerator.generateResourceManifest` (spec.md §6).
#[async_trait]
pub trait ResourceManifestGenerator: Send + Sync {
    async fn generate_resource_manifest(
        &self,
        process: &TransferProcess,
    ) -> Result<ResourceManifest, CollaboratorError>;
}
