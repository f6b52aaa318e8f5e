//! `TransferProcessManager` (spec.md §2, §4.2, §4.6): the state-machine
//! driver. Owns a single long-running worker, polls the store by state,
//! dispatches per-state handlers, and applies resulting transitions.
//!
//! The worker loop follows the teacher's graceful-shutdown convention —
//! `tokio::select!` between the wait-strategy timer and a shutdown
//! `Notify` (`bin/server.rs`'s pattern), so `stop()` is responsive rather
//! than only observed between ticks.

mod handlers;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::commands::{Command, CommandQueue, CommandRunner};
use crate::error::ManagerError;
use crate::monitor::Monitor;
use crate::observable::Observable;
use crate::process::{DataRequest, TransferProcess, TransferProcessKind, TransferProcessState, ACTIVE_STATES};
use crate::registries::{
    DataFlowManager, ProvisionManager, RemoteMessageDispatcherRegistry, ResourceManifestGenerator,
    StatusCheckerRegistry,
};
use crate::store::{idempotent_initiate, TransferProcessStore};
use crate::wait_strategy::WaitStrategy;

/// Collaborators and tunables shared by the tick loop and its handlers.
/// Cloning the manager clones only the `Arc<Inner>`, matching the
/// teacher's `Clone`-cheap service-struct convention.
pub(crate) struct Inner {
    pub(crate) store: Arc<dyn TransferProcessStore>,
    pub(crate) provision_manager: Arc<dyn ProvisionManager>,
    pub(crate) data_flow_manager: Arc<dyn DataFlowManager>,
    pub(crate) dispatcher_registry: Arc<dyn RemoteMessageDispatcherRegistry>,
    pub(crate) manifest_generator: Arc<dyn ResourceManifestGenerator>,
    pub(crate) status_checker_registry: Arc<dyn StatusCheckerRegistry>,
    pub(crate) observable: Arc<Observable>,
    command_queue: Arc<dyn CommandQueue>,
    command_runner: Arc<dyn CommandRunner>,
    wait_strategy: Arc<dyn WaitStrategy>,
    pub(crate) monitor: Arc<dyn Monitor>,
    batch_size: usize,
    command_batch_size: usize,
    tick_count: AtomicU64,
    last_productive_tick: Mutex<Option<DateTime<Utc>>>,
}

impl Inner {
    async fn tick(self: &Arc<Self>) -> bool {
        let mut productive = false;

        let commands = self.command_queue.drain(self.command_batch_size).await;
        for command in commands {
            match self.command_runner.run(command).await {
                Ok(()) => productive = true,
                Err(e) => self
                    .monitor
                    .error(&format!("command execution failed: {e}")),
            }
        }

        for state in ACTIVE_STATES {
            let processes = match self.store.next_for_state(state, self.batch_size).await {
                Ok(processes) => processes,
                Err(e) => {
                    self.monitor
                        .error(&format!("store.next_for_state({state:?}) failed: {e}"));
                    continue;
                }
            };

            for process in processes {
                match self.dispatch(state, process).await {
                    Ok(advanced) => productive |= advanced,
                    Err(e) => self.monitor.error(&format!("handler failed: {e}")),
                }
            }
        }

        self.tick_count.fetch_add(1, Ordering::Relaxed);
        if productive {
            *self.last_productive_tick.lock().unwrap() = Some(Utc::now());
        }
        productive
    }

    /// Fixed per-state dispatch (spec.md §4.1). Returns whether the
    /// handler performed a synchronous transition this tick; handlers
    /// that kick off async provisioner/dispatcher work report `false`
    /// immediately and complete their transition later from the spawned
    /// task (spec.md §4.2 concurrency contract).
    async fn dispatch(
        self: &Arc<Self>,
        state: TransferProcessState,
        process: TransferProcess,
    ) -> Result<bool, ManagerError> {
        match state {
            TransferProcessState::Initial => self.handle_initial(process).await,
            TransferProcessState::Provisioning => self.handle_provisioning(process).await,
            TransferProcessState::Provisioned => self.handle_provisioned(process).await,
            TransferProcessState::Requesting => self.handle_requesting(process).await,
            TransferProcessState::Requested => self.handle_requested(process).await,
            TransferProcessState::InProgress | TransferProcessState::Streaming => {
                self.handle_in_progress_or_streaming(process).await
            }
            TransferProcessState::Completed => self.handle_completed(process).await,
            TransferProcessState::Deprovisioning => self.handle_deprovisioning(process).await,
            TransferProcessState::Deprovisioned => self.handle_deprovisioned(process).await,
            TransferProcessState::Ended | TransferProcessState::Error => Ok(false),
        }
    }
}

/// Builds a `TransferProcessManager`. All collaborators are required
/// (spec.md §4.6: "All must be non-null").
pub struct TransferProcessManagerBuilder {
    store: Option<Arc<dyn TransferProcessStore>>,
    provision_manager: Option<Arc<dyn ProvisionManager>>,
    data_flow_manager: Option<Arc<dyn DataFlowManager>>,
    dispatcher_registry: Option<Arc<dyn RemoteMessageDispatcherRegistry>>,
    manifest_generator: Option<Arc<dyn ResourceManifestGenerator>>,
    status_checker_registry: Option<Arc<dyn StatusCheckerRegistry>>,
    observable: Option<Arc<Observable>>,
    command_queue: Option<Arc<dyn CommandQueue>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
    wait_strategy: Option<Arc<dyn WaitStrategy>>,
    monitor: Option<Arc<dyn Monitor>>,
    batch_size: Option<usize>,
    command_batch_size: Option<usize>,
}

impl Default for TransferProcessManagerBuilder {
    fn default() -> Self {
        Self {
            store: None,
            provision_manager: None,
            data_flow_manager: None,
            dispatcher_registry: None,
            manifest_generator: None,
            status_checker_registry: None,
            observable: None,
            command_queue: None,
            command_runner: None,
            wait_strategy: None,
            monitor: None,
            batch_size: None,
            command_batch_size: None,
        }
    }
}

macro_rules! setter {
    ($name:ident, $field:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

impl TransferProcessManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    setter!(store, store, Arc<dyn TransferProcessStore>);
    setter!(provision_manager, provision_manager, Arc<dyn ProvisionManager>);
    setter!(data_flow_manager, data_flow_manager, Arc<dyn DataFlowManager>);
    setter!(
        dispatcher_registry,
        dispatcher_registry,
        Arc<dyn RemoteMessageDispatcherRegistry>
    );
    setter!(
        manifest_generator,
        manifest_generator,
        Arc<dyn ResourceManifestGenerator>
    );
    setter!(
        status_checker_registry,
        status_checker_registry,
        Arc<dyn StatusCheckerRegistry>
    );
    setter!(observable, observable, Arc<Observable>);
    setter!(command_queue, command_queue, Arc<dyn CommandQueue>);
    setter!(command_runner, command_runner, Arc<dyn CommandRunner>);
    setter!(wait_strategy, wait_strategy, Arc<dyn WaitStrategy>);
    setter!(monitor, monitor, Arc<dyn Monitor>);

    pub fn batch_size(mut self, value: usize) -> Self {
        self.batch_size = Some(value);
        self
    }

    pub fn command_batch_size(mut self, value: usize) -> Self {
        self.command_batch_size = Some(value);
        self
    }

    pub fn build(self) -> Result<TransferProcessManager, ManagerError> {
        macro_rules! required {
            ($field:ident, $name:literal) => {
                self.$field
                    .ok_or(ManagerError::IncompleteBuilder { field: $name })?
            };
        }

        let batch_size = self.batch_size.unwrap_or(10);
        if batch_size == 0 {
            return Err(ManagerError::InvalidBatchSize);
        }

        let inner = Inner {
            store: required!(store, "store"),
            provision_manager: required!(provision_manager, "provision_manager"),
            data_flow_manager: required!(data_flow_manager, "data_flow_manager"),
            dispatcher_registry: required!(dispatcher_registry, "dispatcher_registry"),
            manifest_generator: required!(manifest_generator, "manifest_generator"),
            status_checker_registry: required!(status_checker_registry, "status_checker_registry"),
            observable: required!(observable, "observable"),
            command_queue: required!(command_queue, "command_queue"),
            command_runner: required!(command_runner, "command_runner"),
            wait_strategy: required!(wait_strategy, "wait_strategy"),
            monitor: required!(monitor, "monitor"),
            batch_size,
            command_batch_size: self.command_batch_size.unwrap_or(batch_size),
            tick_count: AtomicU64::new(0),
            last_productive_tick: Mutex::new(None),
        };

        Ok(TransferProcessManager {
            inner: Arc::new(inner),
            shutdown: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        })
    }
}

/// Point-in-time health snapshot, ambient observability in the style of
/// the teacher's `SystemHealth` (SPEC_FULL.md §4.6).
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub ticks_completed: u64,
    pub last_productive_tick: Option<DateTime<Utc>>,
    pub listener_count: usize,
    pub command_queue_depth: usize,
}

pub struct TransferProcessManager {
    inner: Arc<Inner>,
    shutdown: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TransferProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferProcessManager")
            .field("running", &self.worker.lock().unwrap().is_some())
            .finish()
    }
}

impl TransferProcessManager {
    /// Launch the worker (spec.md §4.6).
    pub fn start(&self) -> Result<(), ManagerError> {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return Err(ManagerError::AlreadyRunning);
        }

        let inner = self.inner.clone();
        let shutdown = self.shutdown.clone();
        *worker = Some(tokio::spawn(run_loop(inner, shutdown)));
        Ok(())
    }

    /// Signal shutdown and wait for the current tick to complete
    /// (spec.md §4.6, §5: in-flight async work is not cancelled).
    pub async fn stop(&self) {
        self.shutdown.notify_one();
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// `initiateConsumerRequest` (spec.md §4.4).
    pub async fn initiate_consumer_request(
        &self,
        data_request: DataRequest,
    ) -> Result<String, ManagerError> {
        idempotent_initiate(
            self.inner.store.as_ref(),
            TransferProcessKind::Consumer,
            data_request,
        )
        .await
        .map_err(ManagerError::from)
    }

    /// `initiateProviderRequest` (spec.md §4.4).
    pub async fn initiate_provider_request(
        &self,
        data_request: DataRequest,
    ) -> Result<String, ManagerError> {
        idempotent_initiate(
            self.inner.store.as_ref(),
            TransferProcessKind::Provider,
            data_request,
        )
        .await
        .map_err(ManagerError::from)
    }

    /// Run exactly one tick without starting the background worker —
    /// used by tests to drive the scheduler deterministically instead of
    /// racing a real timer.
    pub async fn tick_once(&self) -> bool {
        self.inner.tick().await
    }

    pub async fn submit(&self, command: Command) {
        self.inner.command_queue.push(command).await;
    }

    pub async fn health_report(&self) -> HealthReport {
        HealthReport {
            ticks_completed: self.inner.tick_count.load(Ordering::Relaxed),
            last_productive_tick: *self.inner.last_productive_tick.lock().unwrap(),
            listener_count: self.inner.observable.listener_count(),
            command_queue_depth: self.inner.command_queue.len().await,
        }
    }
}

async fn run_loop(inner: Arc<Inner>, shutdown: Arc<Notify>) {
    loop {
        let productive = inner.tick().await;
        if productive {
            inner.wait_strategy.success();
        }

        let wait_ms = inner.wait_strategy.wait_for_millis();
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
            _ = shutdown.notified() => break,
        }
    }
}
