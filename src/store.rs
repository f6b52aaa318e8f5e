//! `TransferProcessStore` (spec.md §6) and the idempotent-initiation
//! helper it backs (spec.md §4.4).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TransferProcessError;
use crate::process::{TransferProcess, TransferProcessKind, TransferProcessState};

/// Optional transaction boundary for a read-modify-write sequence
/// (spec.md §5 race policy: "a read-modify-write must be executed under
/// the store's `TransactionContext` when available"). Stores that don't
/// support transactions can implement this as a no-op.
#[async_trait]
pub trait TransactionContext: Send + Sync {
    async fn commit(&self) -> Result<(), TransferProcessError>;
    async fn rollback(&self) -> Result<(), TransferProcessError>;
}

/// Default `TransactionContext` for stores without real transaction
/// support — `commit`/`rollback` are both unconditional no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransactionContext;

#[async_trait]
impl TransactionContext for NoopTransactionContext {
    async fn commit(&self) -> Result<(), TransferProcessError> {
        Ok(())
    }

    async fn rollback(&self) -> Result<(), TransferProcessError> {
        Ok(())
    }
}

/// Persistent repository of transfer processes, indexed by id and
/// queryable by state (spec.md §6).
#[async_trait]
pub trait TransferProcessStore: Send + Sync {
    /// Returns up to `batch_size` processes currently in `state`. The
    /// scheduler tolerates duplicate returns across calls; leasing is
    /// not required at this layer (spec.md §6, §9 open questions).
    async fn next_for_state(
        &self,
        state: TransferProcessState,
        batch_size: usize,
    ) -> Result<Vec<TransferProcess>, TransferProcessError>;

    async fn find(&self, id: &str) -> Result<Option<TransferProcess>, TransferProcessError>;

    /// Must reject duplicates by id.
    async fn create(&self, process: TransferProcess) -> Result<(), TransferProcessError>;

    async fn update(&self, process: TransferProcess) -> Result<(), TransferProcessError>;

    async fn process_id_for_transfer_id(
        &self,
        transfer_id: &str,
    ) -> Result<Option<String>, TransferProcessError>;
}

/// `initiateConsumerRequest` / `initiateProviderRequest` (spec.md §4.4).
///
/// Shared by `TransferProcessManager`'s public API and by
/// `DefaultCommandRunner`, so both entry points get the same
/// at-most-once-per-`dataRequest.id` guarantee.
pub async fn idempotent_initiate(
    store: &dyn TransferProcessStore,
    kind: TransferProcessKind,
    data_request: crate::process::DataRequest,
) -> Result<String, TransferProcessError> {
    if let Some(pid) = store.process_id_for_transfer_id(&data_request.id).await? {
        return Ok(pid);
    }

    let process = TransferProcess::new(kind, data_request);
    let id = process.id.clone();
    store.create(process).await?;
    Ok(id)
}

/// In-memory `TransferProcessStore` used by the test suite and as a
/// runnable reference implementation of the contract (SPEC_FULL.md §6).
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct InMemoryTransferProcessStore {
    processes: Mutex<HashMap<String, TransferProcess>>,
    transfer_index: Mutex<HashMap<String, String>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl InMemoryTransferProcessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a process directly, bypassing `create`'s duplicate check —
    /// used by tests that want to start a scenario mid-lifecycle (e.g.
    /// S2-S5 in spec.md §8, which seed a process already past `INITIAL`).
    pub fn seed(&self, process: TransferProcess) {
        self.transfer_index
            .lock()
            .unwrap()
            .insert(process.transfer_id().to_string(), process.id.clone());
        self.processes
            .lock()
            .unwrap()
            .insert(process.id.clone(), process);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl TransferProcessStore for InMemoryTransferProcessStore {
    async fn next_for_state(
        &self,
        state: TransferProcessState,
        batch_size: usize,
    ) -> Result<Vec<TransferProcess>, TransferProcessError> {
        let processes = self.processes.lock().unwrap();
        Ok(processes
            .values()
            .filter(|p| p.state == state)
            .take(batch_size)
            .cloned()
            .collect())
    }

    async fn find(&self, id: &str) -> Result<Option<TransferProcess>, TransferProcessError> {
        Ok(self.processes.lock().unwrap().get(id).cloned())
    }

    async fn create(&self, process: TransferProcess) -> Result<(), TransferProcessError> {
        let mut processes = self.processes.lock().unwrap();
        if processes.contains_key(&process.id) {
            return Err(TransferProcessError::DuplicateTransferId {
                transfer_id: process.transfer_id().to_string(),
            });
        }
        let mut index = self.transfer_index.lock().unwrap();
        if index.contains_key(process.transfer_id()) {
            return Err(TransferProcessError::DuplicateTransferId {
                transfer_id: process.transfer_id().to_string(),
            });
        }
        index.insert(process.transfer_id().to_string(), process.id.clone());
        processes.insert(process.id.clone(), process);
        Ok(())
    }

    async fn update(&self, mut process: TransferProcess) -> Result<(), TransferProcessError> {
        let mut processes = self.processes.lock().unwrap();
        if !processes.contains_key(&process.id) {
            return Err(TransferProcessError::NotFound {
                id: process.id.clone(),
            });
        }
        process.touch();
        processes.insert(process.id.clone(), process);
        Ok(())
    }

    async fn process_id_for_transfer_id(
        &self,
        transfer_id: &str,
    ) -> Result<Option<String>, TransferProcessError> {
        Ok(self
            .transfer_index
            .lock()
            .unwrap()
            .get(transfer_id)
            .cloned())
    }
}
