//! Per-state handlers (spec.md §4.1, §5). Four of these kick off work on
//! a `ResourceProvisioner`/`DataFlowManager`/`RemoteMessageDispatcher` —
//! they spawn it, return immediately, and complete the transition from a
//! background task that re-fetches the process, checks it's still in the
//! state it started from, and only then mutates and writes (spec.md §5:
//! "a handler must not mutate a process it last read before an await
//! point without first re-reading it").
//!
//! Grounded on the teacher's `task_finalization::state_handlers`
//! exhaustive per-state match and its "fetch, mutate, persist, publish"
//! sequencing.

use std::sync::Arc;

use crate::error::ManagerError;
use crate::process::{TransferProcess, TransferProcessKind, TransferProcessState};
use crate::registries::{DataFlowResult, RemoteMessageDispatcher};
use crate::status_check;

use super::Inner;

impl Inner {
    pub(super) async fn handle_initial(
        self: &Arc<Self>,
        mut process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        match self
            .manifest_generator
            .generate_resource_manifest(&process)
            .await
        {
            Ok(manifest) => {
                let provisioning_needed = !manifest.is_empty();
                process.resource_manifest = manifest;
                process.state = if provisioning_needed {
                    TransferProcessState::Provisioning
                } else {
                    TransferProcessState::Provisioned
                };
            }
            Err(e) => {
                process.state = TransferProcessState::Error;
                process.error_detail = Some(e.to_string());
            }
        }

        self.store.update(process.clone()).await?;
        self.observable.notify(&process);
        Ok(true)
    }

    pub(super) async fn handle_provisioning(
        self: &Arc<Self>,
        process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        let inner = self.clone();
        tokio::spawn(async move {
            inner.complete_provisioning(process).await;
        });
        Ok(false)
    }

    async fn complete_provisioning(&self, process: TransferProcess) {
        let result = self.provision_manager.provision(&process).await;

        let mut current = match self.store.find(&process.id).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                self.monitor
                    .error(&format!("refetch after provisioning failed: {e}"));
                return;
            }
        };
        if current.state != TransferProcessState::Provisioning {
            return;
        }

        match result {
            Ok(responses) => {
                current.provisioned_resource_set.resources =
                    responses.into_iter().map(|r| r.resource).collect();
                current.state = TransferProcessState::Provisioned;
            }
            Err(e) => {
                current.state = TransferProcessState::Error;
                current.error_detail = Some(e.to_string());
            }
        }

        if let Err(e) = self.store.update(current.clone()).await {
            self.monitor
                .error(&format!("store update after provisioning failed: {e}"));
            return;
        }
        self.observable.notify(&current);
    }

    pub(super) async fn handle_provisioned(
        self: &Arc<Self>,
        mut process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        match process.kind {
            TransferProcessKind::Consumer => {
                process.state = TransferProcessState::Requesting;
                self.store.update(process.clone()).await?;
                self.observable.notify(&process);
                Ok(true)
            }
            TransferProcessKind::Provider => {
                let inner = self.clone();
                tokio::spawn(async move {
                    inner.complete_data_flow_initiation(process).await;
                });
                Ok(false)
            }
        }
    }

    async fn complete_data_flow_initiation(&self, process: TransferProcess) {
        let result = self.data_flow_manager.initiate(&process).await;

        let mut current = match self.store.find(&process.id).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                self.monitor
                    .error(&format!("refetch after data flow initiation failed: {e}"));
                return;
            }
        };
        if current.state != TransferProcessState::Provisioned {
            return;
        }

        match result {
            DataFlowResult::Success { .. } => {
                current.state = TransferProcessState::InProgress;
            }
            DataFlowResult::Failure { error_detail } => {
                current.state = TransferProcessState::Error;
                current.error_detail = Some(error_detail);
            }
        }

        if let Err(e) = self.store.update(current.clone()).await {
            self.monitor
                .error(&format!("store update after data flow initiation failed: {e}"));
            return;
        }
        self.observable.notify(&current);
    }

    pub(super) async fn handle_requesting(
        self: &Arc<Self>,
        process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        match self
            .dispatcher_registry
            .dispatcher_for(&process.data_request.protocol)
        {
            None => {
                self.monitor.error(&format!(
                    "no dispatcher registered for protocol {}",
                    process.data_request.protocol
                ));
                Ok(false)
            }
            Some(dispatcher) => {
                let inner = self.clone();
                tokio::spawn(async move {
                    inner.complete_request_dispatch(process, dispatcher).await;
                });
                Ok(false)
            }
        }
    }

    async fn complete_request_dispatch(
        &self,
        process: TransferProcess,
        dispatcher: Arc<dyn RemoteMessageDispatcher>,
    ) {
        // A failed dispatch leaves the process in REQUESTING untouched —
        // the next tick picks it up again (spec.md §7: transient handler
        // errors are retried, not recorded as ERROR).
        if let Err(e) = dispatcher.send(&process.data_request).await {
            self.monitor
                .error(&format!("remote dispatch failed, will retry: {e}"));
            return;
        }

        let mut current = match self.store.find(&process.id).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                self.monitor
                    .error(&format!("refetch after request dispatch failed: {e}"));
                return;
            }
        };
        if current.state != TransferProcessState::Requesting {
            return;
        }

        current.state = TransferProcessState::Requested;
        if let Err(e) = self.store.update(current.clone()).await {
            self.monitor
                .error(&format!("store update after request dispatch failed: {e}"));
            return;
        }
        self.observable.notify(&current);
    }

    pub(super) async fn handle_requested(
        self: &Arc<Self>,
        mut process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        if !process.provisioned_resource_set.has_destination_resource() {
            return Ok(false);
        }

        process.state = if process.data_request.transfer_type.is_finite {
            TransferProcessState::InProgress
        } else {
            TransferProcessState::Streaming
        };
        self.store.update(process.clone()).await?;
        self.observable.notify(&process);
        Ok(true)
    }

    /// `COMPLETED` is written and observed here but is not itself one of
    /// the polled active states (spec.md §4.2 step 2 omits it) — the
    /// fork to `DEPROVISIONING`/`DEPROVISIONED` runs immediately after,
    /// in the same handler invocation, producing two updates in one
    /// tick (spec.md §8 S1's observed sequence includes both).
    pub(super) async fn handle_in_progress_or_streaming(
        self: &Arc<Self>,
        mut process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        if !status_check::is_done(&process, self.status_checker_registry.as_ref()) {
            return Ok(false);
        }

        process.state = TransferProcessState::Completed;
        self.store.update(process.clone()).await?;
        self.observable.notify(&process);

        self.advance_from_completed(process).await
    }

    async fn advance_from_completed(
        &self,
        mut process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        process.state = if process.managed_resources() {
            TransferProcessState::Deprovisioning
        } else {
            TransferProcessState::Deprovisioned
        };
        self.store.update(process.clone()).await?;
        self.observable.notify(&process);
        Ok(true)
    }

    /// Reachable only if a caller seeds a process directly into
    /// `COMPLETED` — the scheduler itself never polls this state (see
    /// `handle_in_progress_or_streaming`).
    pub(super) async fn handle_completed(
        self: &Arc<Self>,
        process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        self.advance_from_completed(process).await
    }

    pub(super) async fn handle_deprovisioning(
        self: &Arc<Self>,
        process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        let inner = self.clone();
        tokio::spawn(async move {
            inner.complete_deprovisioning(process).await;
        });
        Ok(false)
    }

    async fn complete_deprovisioning(&self, process: TransferProcess) {
        let result = self.provision_manager.deprovision(&process).await;

        let mut current = match self.store.find(&process.id).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                self.monitor
                    .error(&format!("refetch after deprovisioning failed: {e}"));
                return;
            }
        };
        if current.state != TransferProcessState::Deprovisioning {
            return;
        }

        match result {
            Ok(_) => current.state = TransferProcessState::Deprovisioned,
            Err(e) => {
                current.state = TransferProcessState::Error;
                current.error_detail = Some(e.to_string());
            }
        }

        if let Err(e) = self.store.update(current.clone()).await {
            self.monitor
                .error(&format!("store update after deprovisioning failed: {e}"));
            return;
        }
        self.observable.notify(&current);
    }

    pub(super) async fn handle_deprovisioned(
        self: &Arc<Self>,
        mut process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        process.state = TransferProcessState::Ended;
        self.store.update(process.clone()).await?;
        self.observable.notify(&process);
        Ok(true)
    }
}
