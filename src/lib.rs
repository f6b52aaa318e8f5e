//! A restartable state-machine scheduler that drives data-transfer
//! processes through provisioning, request dispatch, in-flight
//! monitoring, and tear-down.
//!
//! The crate is a library: it provides the scheduler, its data model,
//! and the collaborator traits a host application implements and wires
//! together through [`manager::TransferProcessManagerBuilder`]. It does
//! not ship a binary, persistence layer, or wire protocol of its own —
//! those are host concerns (see `SPEC_FULL.md`).

pub mod commands;
pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod observable;
pub mod process;
pub mod registries;
pub mod status_check;
pub mod store;
pub mod wait_strategy;

pub use commands::{Command, CommandQueue, CommandRunner, InMemoryCommandQueue, DefaultCommandRunner};
pub use config::TransferManagerConfig;
pub use error::{CollaboratorError, ManagerError, TransferProcessError};
pub use manager::{HealthReport, TransferProcessManager, TransferProcessManagerBuilder};
pub use monitor::{Monitor, TracingMonitor};
pub use observable::{Observable, TransferProcessListener};
pub use process::{
    DataRequest, ProvisionedResource, ProvisionedResourceSet, ResourceDefinition, ResourceManifest,
    TransferProcess, TransferProcessKind, TransferProcessState, TransferType, ACTIVE_STATES,
};
pub use registries::{
    DataFlowManager, DataFlowResult, DeprovisionResponse, KeyedDispatcherRegistry,
    KeyedProvisionManager, KeyedStatusCheckerRegistry, ProvisionManager, ProvisionResponse,
    RemoteMessageDispatcher, RemoteMessageDispatcherRegistry, ResourceManifestGenerator,
    ResourceProvisioner, StatusChecker, StatusCheckerRegistry,
};
pub use store::{NoopTransactionContext, TransactionContext, TransferProcessStore};
pub use wait_strategy::{ConstantWaitStrategy, ExponentialBackoffWaitStrategy, WaitStrategy};

#[cfg(any(test, feature = "test-utils"))]
pub use store::InMemoryTransferProcessStore;
