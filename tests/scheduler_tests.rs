//! End-to-end scheduler scenarios and cross-cutting properties, each
//! running against an `InMemoryTransferProcessStore` with every active
//! state handled in a single `TransferProcessManager`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use transfer_process_manager::{
    CollaboratorError, Command, ConstantWaitStrategy, DataFlowManager, DataFlowResult,
    DataRequest, DeprovisionResponse, InMemoryCommandQueue, InMemoryTransferProcessStore,
    KeyedDispatcherRegistry, KeyedStatusCheckerRegistry, Observable, ProvisionManager,
    ProvisionResponse, ProvisionedResource, RemoteMessageDispatcher, ResourceDefinition,
    ResourceManifest, ResourceManifestGenerator, StatusChecker, TracingMonitor, TransferProcess,
    TransferProcessError, TransferProcessKind, TransferProcessListener, TransferProcessManager,
    TransferProcessManagerBuilder, TransferProcessState, TransferProcessStore, TransferType,
};

fn data_request(transfer_id: &str, managed_resources: bool, is_finite: bool) -> DataRequest {
    DataRequest {
        id: transfer_id.to_string(),
        destination_type: "object-store".to_string(),
        transfer_type: TransferType { is_finite },
        managed_resources,
        protocol: "dsp".to_string(),
        connector_id: "connector-a".to_string(),
        destination: serde_json::json!({}),
    }
}

/// One fixed resource definition ("bucket"), always returned regardless
/// of the process — enough to drive a single-resource manifest through
/// provisioning in the scenarios below.
struct FixedManifestGenerator;

#[async_trait]
impl ResourceManifestGenerator for FixedManifestGenerator {
    async fn generate_resource_manifest(
        &self,
        _process: &TransferProcess,
    ) -> Result<ResourceManifest, CollaboratorError> {
        Ok(ResourceManifest {
            definitions: vec![ResourceDefinition {
                id: "def-1".to_string(),
                resource_type: "bucket".to_string(),
            }],
        })
    }
}

/// Either always succeeds (attaching one destination resource per
/// definition) or always fails, depending on construction.
struct FixedProvisionManager {
    succeed: bool,
}

#[async_trait]
impl ProvisionManager for FixedProvisionManager {
    async fn provision(
        &self,
        process: &TransferProcess,
    ) -> Result<Vec<ProvisionResponse>, CollaboratorError> {
        if !self.succeed {
            return Err(CollaboratorError::Provision {
                reason: "provision failed".to_string(),
            });
        }
        Ok(process
            .resource_manifest
            .definitions
            .iter()
            .map(|definition| ProvisionResponse {
                resource: ProvisionedResource::Destination {
                    id: format!("resource-{}", definition.id),
                    resource_definition_id: definition.id.clone(),
                    resource_type: definition.resource_type.clone(),
                },
            })
            .collect())
    }

    async fn deprovision(
        &self,
        process: &TransferProcess,
    ) -> Result<Vec<DeprovisionResponse>, CollaboratorError> {
        Ok(process
            .provisioned_resource_set
            .resources
            .iter()
            .map(|r| DeprovisionResponse {
                resource_id: r.id().to_string(),
            })
            .collect())
    }
}

struct FixedDataFlowManager {
    succeed: bool,
}

#[async_trait]
impl DataFlowManager for FixedDataFlowManager {
    async fn initiate(&self, _process: &TransferProcess) -> DataFlowResult {
        if self.succeed {
            DataFlowResult::Success {
                endpoint_ref: "endpoint-1".to_string(),
            }
        } else {
            DataFlowResult::Failure {
                error_detail: "data flow failed".to_string(),
            }
        }
    }
}

struct AckDispatcher;

#[async_trait]
impl RemoteMessageDispatcher for AckDispatcher {
    async fn send(&self, _message: &DataRequest) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

struct FixedStatusChecker {
    complete: bool,
}

impl StatusChecker for FixedStatusChecker {
    fn is_complete(&self, _process: &TransferProcess, _resource: &ProvisionedResource) -> bool {
        self.complete
    }
}

struct RecordingListener(Arc<Mutex<Vec<TransferProcessState>>>);

impl TransferProcessListener for RecordingListener {
    fn on_transition(&self, process: &TransferProcess) -> Result<(), String> {
        self.0.lock().unwrap().push(process.state);
        Ok(())
    }
}

/// Wraps an `InMemoryTransferProcessStore` and counts calls, so tests can
/// assert the absence of writes (property 3, 4) or the exact number of
/// lookups/creates (S6) without inspecting private state.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryTransferProcessStore,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    next_for_state_calls: Mutex<HashMap<TransferProcessState, usize>>,
    updated_ids: Mutex<Vec<String>>,
}

#[async_trait]
impl TransferProcessStore for CountingStore {
    async fn next_for_state(
        &self,
        state: TransferProcessState,
        batch_size: usize,
    ) -> Result<Vec<TransferProcess>, TransferProcessError> {
        *self
            .next_for_state_calls
            .lock()
            .unwrap()
            .entry(state)
            .or_insert(0) += 1;
        self.inner.next_for_state(state, batch_size).await
    }

    async fn find(&self, id: &str) -> Result<Option<TransferProcess>, TransferProcessError> {
        self.inner.find(id).await
    }

    async fn create(&self, process: TransferProcess) -> Result<(), TransferProcessError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.create(process).await
    }

    async fn update(&self, process: TransferProcess) -> Result<(), TransferProcessError> {
        self.update_calls.fetch_add(1, Ordering::Relaxed);
        self.updated_ids.lock().unwrap().push(process.id.clone());
        self.inner.update(process).await
    }

    async fn process_id_for_transfer_id(
        &self,
        transfer_id: &str,
    ) -> Result<Option<String>, TransferProcessError> {
        self.lookup_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.process_id_for_transfer_id(transfer_id).await
    }
}

struct Fixture {
    manager: TransferProcessManager,
    store: Arc<CountingStore>,
    listener_log: Arc<Mutex<Vec<TransferProcessState>>>,
}

fn build_fixture(
    provision_succeeds: bool,
    data_flow_succeeds: bool,
    dispatch_protocol: &str,
    checker_complete: bool,
) -> Fixture {
    let store = Arc::new(CountingStore::default());
    let listener_log = Arc::new(Mutex::new(Vec::new()));
    let observable = Arc::new(Observable::new());
    observable.register_listener(Arc::new(RecordingListener(listener_log.clone())));

    let mut dispatcher_registry = KeyedDispatcherRegistry::new();
    dispatcher_registry.register(dispatch_protocol, Arc::new(AckDispatcher));

    let mut status_checker_registry = KeyedStatusCheckerRegistry::new();
    status_checker_registry.register(
        "bucket",
        Arc::new(FixedStatusChecker {
            complete: checker_complete,
        }),
    );

    let manager = TransferProcessManagerBuilder::new()
        .store(store.clone())
        .provision_manager(Arc::new(FixedProvisionManager {
            succeed: provision_succeeds,
        }))
        .data_flow_manager(Arc::new(FixedDataFlowManager {
            succeed: data_flow_succeeds,
        }))
        .dispatcher_registry(Arc::new(dispatcher_registry))
        .manifest_generator(Arc::new(FixedManifestGenerator))
        .status_checker_registry(Arc::new(status_checker_registry))
        .observable(observable)
        .command_queue(Arc::new(InMemoryCommandQueue::new()))
        .command_runner(Arc::new(transfer_process_manager::DefaultCommandRunner::new(
            store.clone(),
        )))
        .wait_strategy(Arc::new(ConstantWaitStrategy::new(1)))
        .monitor(Arc::new(TracingMonitor))
        .batch_size(10)
        .build()
        .unwrap();

    Fixture {
        manager,
        store,
        listener_log,
    }
}

/// Drives `n` ticks, pausing between each so a tick's spawned completion
/// task (provisioning, data-flow initiation, dispatch, deprovisioning)
/// has a chance to land before the next tick re-polls the store.
async fn run_ticks(manager: &TransferProcessManager, n: usize) {
    for _ in 0..n {
        manager.tick_once().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn s1_consumer_happy_path_reaches_ended() {
    let fixture = build_fixture(true, true, "dsp", true);

    let process = TransferProcess::new(TransferProcessKind::Consumer, data_request("t1", true, true));
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    run_ticks(&fixture.manager, 12).await;

    let final_process = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(final_process.state, TransferProcessState::Ended);

    let observed = fixture.listener_log.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec![
            TransferProcessState::Provisioning,
            TransferProcessState::Provisioned,
            TransferProcessState::Requesting,
            TransferProcessState::Requested,
            TransferProcessState::InProgress,
            TransferProcessState::Completed,
            TransferProcessState::Deprovisioning,
            TransferProcessState::Deprovisioned,
            TransferProcessState::Ended,
        ]
    );
}

#[tokio::test]
async fn s2_provider_happy_path_reaches_in_progress() {
    let fixture = build_fixture(true, true, "dsp", true);

    let mut process = TransferProcess::new(TransferProcessKind::Provider, data_request("t2", true, true));
    process.state = TransferProcessState::Provisioned;
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    run_ticks(&fixture.manager, 1).await;

    let updated = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(updated.state, TransferProcessState::InProgress);
}

#[tokio::test]
async fn s3_provision_failure_transitions_to_error() {
    let fixture = build_fixture(false, true, "dsp", true);

    let mut process = TransferProcess::new(TransferProcessKind::Consumer, data_request("t3", true, true));
    process.state = TransferProcessState::Provisioning;
    process.resource_manifest.definitions.push(ResourceDefinition {
        id: "def-1".to_string(),
        resource_type: "bucket".to_string(),
    });
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    run_ticks(&fixture.manager, 1).await;

    let updated = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(updated.state, TransferProcessState::Error);
    assert!(updated.error_detail.unwrap().contains("provision failed"));

    let observed = fixture.listener_log.lock().unwrap().clone();
    assert!(!observed.contains(&TransferProcessState::Provisioned));
}

#[tokio::test]
async fn s4_streaming_branch_on_non_finite_transfer() {
    let fixture = build_fixture(true, true, "dsp", true);

    let mut process =
        TransferProcess::new(TransferProcessKind::Consumer, data_request("t4", true, false));
    process.state = TransferProcessState::Requested;
    process.provisioned_resource_set.resources.push(ProvisionedResource::Destination {
        id: "r1".to_string(),
        resource_definition_id: "def-1".to_string(),
        resource_type: "bucket".to_string(),
    });
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    run_ticks(&fixture.manager, 1).await;

    let updated = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(updated.state, TransferProcessState::Streaming);
}

#[tokio::test]
async fn property5_finite_branch_on_finite_transfer() {
    let fixture = build_fixture(true, true, "dsp", true);

    let mut process =
        TransferProcess::new(TransferProcessKind::Consumer, data_request("t4b", true, true));
    process.state = TransferProcessState::Requested;
    process.provisioned_resource_set.resources.push(ProvisionedResource::Destination {
        id: "r1".to_string(),
        resource_definition_id: "def-1".to_string(),
        resource_type: "bucket".to_string(),
    });
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    run_ticks(&fixture.manager, 1).await;

    let updated = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(updated.state, TransferProcessState::InProgress);
}

#[tokio::test]
async fn s5_waiting_on_resources_issues_no_update() {
    let fixture = build_fixture(true, true, "dsp", true);

    let mut process =
        TransferProcess::new(TransferProcessKind::Consumer, data_request("t5", true, true));
    process.state = TransferProcessState::Requested;
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    run_ticks(&fixture.manager, 3).await;

    let calls = fixture.store.next_for_state_calls.lock().unwrap();
    assert!(*calls.get(&TransferProcessState::Requested).unwrap_or(&0) >= 1);
    drop(calls);

    assert!(!fixture.store.updated_ids.lock().unwrap().contains(&id));
    let unchanged = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(unchanged.state, TransferProcessState::Requested);
}

#[tokio::test]
async fn s6_idempotent_initiation_under_duplicate_delivery() {
    let fixture = build_fixture(true, true, "dsp", true);

    let id1 = fixture
        .manager
        .initiate_provider_request(data_request("t1", true, true))
        .await
        .unwrap();
    let id2 = fixture
        .manager
        .initiate_provider_request(data_request("t1", true, true))
        .await
        .unwrap();

    assert_eq!(id1, id2);
    assert_eq!(fixture.store.create_calls.load(Ordering::Relaxed), 1);
    assert_eq!(fixture.store.lookup_calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn property1_idempotent_initiation_consumer_side() {
    let fixture = build_fixture(true, true, "dsp", true);

    let id1 = fixture
        .manager
        .initiate_consumer_request(data_request("t-consumer", true, true))
        .await
        .unwrap();
    let id2 = fixture
        .manager
        .initiate_consumer_request(data_request("t-consumer", true, true))
        .await
        .unwrap();

    assert_eq!(id1, id2);
    assert_eq!(fixture.store.create_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn property3_absorption_no_updates_once_terminal() {
    let fixture = build_fixture(true, true, "dsp", true);

    let mut ended = TransferProcess::new(TransferProcessKind::Consumer, data_request("t-ended", true, true));
    ended.state = TransferProcessState::Ended;
    let ended_id = ended.id.clone();
    fixture.store.create(ended).await.unwrap();

    let mut errored = TransferProcess::new(TransferProcessKind::Consumer, data_request("t-errored", true, true));
    errored.state = TransferProcessState::Error;
    let errored_id = errored.id.clone();
    fixture.store.create(errored).await.unwrap();

    run_ticks(&fixture.manager, 5).await;

    let updated_ids = fixture.store.updated_ids.lock().unwrap();
    assert!(!updated_ids.contains(&ended_id));
    assert!(!updated_ids.contains(&errored_id));
}

#[tokio::test]
async fn property2_reachability_without_error() {
    let fixture = build_fixture(true, true, "dsp", true);

    let process = TransferProcess::new(TransferProcessKind::Provider, data_request("t-reach", true, true));
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    run_ticks(&fixture.manager, 12).await;

    let final_process = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(final_process.state, TransferProcessState::Ended);

    let observed = fixture.listener_log.lock().unwrap().clone();
    assert!(!observed.contains(&TransferProcessState::Error));
}

#[tokio::test]
async fn manager_rejects_second_start_while_running() {
    let fixture = build_fixture(true, true, "dsp", true);
    fixture.manager.start().unwrap();
    let err = fixture.manager.start().unwrap_err();
    assert!(matches!(
        err,
        transfer_process_manager::ManagerError::AlreadyRunning
    ));
    fixture.manager.stop().await;
}

#[tokio::test]
async fn cancel_command_moves_non_terminal_process_to_error() {
    let fixture = build_fixture(true, true, "dsp", true);

    let process = TransferProcess::new(TransferProcessKind::Consumer, data_request("t-cancel", true, true));
    let id = process.id.clone();
    fixture.store.create(process).await.unwrap();

    fixture
        .manager
        .submit(Command::Cancel {
            process_id: id.clone(),
        })
        .await;
    fixture.manager.tick_once().await;

    let updated = fixture.store.find(&id).await.unwrap().unwrap();
    assert_eq!(updated.state, TransferProcessState::Error);
}
