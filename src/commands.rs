//! `CommandQueue` + `CommandRunner` (spec.md §2, §4.2, §6): out-of-band
//! control commands interleaved with state advancement, grounded on the
//! teacher's `OrchestrationCommand` request/response pattern
//! (`commands/types.rs`), simplified to the commands the scheduler's
//! contract actually needs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::ManagerError;
use crate::process::{DataRequest, TransferProcessKind};
use crate::store::{idempotent_initiate, TransferProcessStore};

/// Response channel for commands that want the result back, mirroring
/// the teacher's `CommandResponder<T>` alias.
pub type CommandResponder<T> = oneshot::Sender<Result<T, ManagerError>>;

#[derive(Debug)]
pub enum Command {
    InitiateConsumerRequest {
        data_request: DataRequest,
        resp: Option<CommandResponder<String>>,
    },
    InitiateProviderRequest {
        data_request: DataRequest,
        resp: Option<CommandResponder<String>>,
    },
    /// Fire-and-forget: force a process into `ERROR`, e.g. for an
    /// operator-triggered cancellation. Opaque beyond that, per spec.md
    /// §6 ("a queue yielding opaque commands").
    Cancel { process_id: String },
}

#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// Drain up to `max` pending commands without blocking past what's
    /// already queued (spec.md §4.2 step 1).
    async fn drain(&self, max: usize) -> Vec<Command>;

    async fn push(&self, command: Command);

    /// Number of commands currently pending, for health reporting
    /// (SPEC_FULL.md §4.6).
    async fn len(&self) -> usize;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: Command) -> Result<(), ManagerError>;
}

/// FIFO in-memory command queue.
#[derive(Debug, Default)]
pub struct InMemoryCommandQueue {
    queue: Mutex<VecDeque<Command>>,
}

impl InMemoryCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandQueue for InMemoryCommandQueue {
    async fn drain(&self, max: usize) -> Vec<Command> {
        let mut queue = self.queue.lock().unwrap();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    async fn push(&self, command: Command) {
        self.queue.lock().unwrap().push_back(command);
    }

    async fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

/// Applies a `Command` by delegating to the store directly — the same
/// idempotent-initiation path the manager's own public methods use
/// (spec.md §4.4).
pub struct DefaultCommandRunner {
    store: Arc<dyn TransferProcessStore>,
}

impl std::fmt::Debug for DefaultCommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultCommandRunner").finish()
    }
}

impl DefaultCommandRunner {
    pub fn new(store: Arc<dyn TransferProcessStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommandRunner for DefaultCommandRunner {
    async fn run(&self, command: Command) -> Result<(), ManagerError> {
        match command {
            Command::InitiateConsumerRequest { data_request, resp } => {
                let result =
                    idempotent_initiate(self.store.as_ref(), TransferProcessKind::Consumer, data_request)
                        .await
                        .map_err(ManagerError::from);
                if let Some(resp) = resp {
                    let _ = resp.send(result);
                }
                Ok(())
            }
            Command::InitiateProviderRequest { data_request, resp } => {
                let result =
                    idempotent_initiate(self.store.as_ref(), TransferProcessKind::Provider, data_request)
                        .await
                        .map_err(ManagerError::from);
                if let Some(resp) = resp {
                    let _ = resp.send(result);
                }
                Ok(())
            }
            Command::Cancel { process_id } => {
                if let Some(mut process) = self.store.find(&process_id).await? {
                    if !process.state.is_terminal() {
                        process.state = crate::process::TransferProcessState::Error;
                        process.error_detail = Some("cancelled by operator command".to_string());
                        self.store.update(process).await?;
                    }
                }
                Ok(())
            }
        }
    }
}
