//! Error taxonomy for the store boundary and the scheduler boundary.
//!
//! Mirrors the teacher's split between a narrow, structured persistence
//! error (`TransferProcessError`) and a broader scheduler error
//! (`ManagerError`) that wraps it plus the categories from spec.md §7.

use thiserror::Error;

/// Errors returned by a `TransferProcessStore` implementation.
#[derive(Debug, Error)]
pub enum TransferProcessError {
    #[error("a transfer process already exists for transfer id {transfer_id}")]
    DuplicateTransferId { transfer_id: String },

    #[error("transfer process {id} not found")]
    NotFound { id: String },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors surfaced by the external collaborators the scheduler dispatches to.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("provisioning failed: {reason}")]
    Provision { reason: String },

    #[error("manifest generation failed: {reason}")]
    Manifest { reason: String },

    #[error("data flow initiation failed: {reason}")]
    DataFlow { reason: String },

    #[error("remote dispatch failed: {reason}")]
    Dispatch { reason: String },
}

/// Top-level error for the scheduler loop and its builder.
///
/// Variants line up with the taxonomy in spec.md §7: transient handler
/// errors are logged and retried by the next tick and therefore never
/// reach this type; only irrecoverable or contract-violation cases do.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] TransferProcessError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("builder missing required collaborator: {field}")]
    IncompleteBuilder { field: &'static str },

    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("unknown state code: {code}")]
    UnknownStateCode { code: i32 },

    #[error("scheduler worker already running")]
    AlreadyRunning,
}
