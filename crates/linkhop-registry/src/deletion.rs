use linkhop_core::ShortCode;
use linkhop_generator::{Generator, RandomGenerator};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, Result};
use crate::identity::IdentityResolver;
use crate::registry::Registry;

/// A request to soft-delete `codes` on behalf of whoever holds `owner_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub codes: Vec<ShortCode>,
    pub owner_token: String,
}

/// Producer half of the deletion pipeline.
#[derive(Debug, Clone)]
pub struct DeletionQueue {
    sender: mpsc::Sender<DeletionRequest>,
}

impl DeletionQueue {
    /// Creates a bounded queue and the worker that drains it.
    pub fn channel<G: Generator>(
        capacity: usize,
        registry: Registry<G>,
        resolver: IdentityResolver,
    ) -> (Self, DeletionWorker<G>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = DeletionWorker {
            receiver,
            registry,
            resolver,
        };
        (Self { sender }, worker)
    }

    /// Hands a request to the worker without waiting.
    ///
    /// A full queue is reported as [`RegistryError::CapacityExceeded`].
    pub fn enqueue(&self, request: DeletionRequest) -> Result<()> {
        self.sender.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RegistryError::CapacityExceeded,
            mpsc::error::TrySendError::Closed(_) => RegistryError::PipelineClosed,
        })
    }
}

/// Consumer half: applies queued deletions one request at a time, in
/// arrival order.
pub struct DeletionWorker<G: Generator = RandomGenerator> {
    receiver: mpsc::Receiver<DeletionRequest>,
    registry: Registry<G>,
    resolver: IdentityResolver,
}

impl<G: Generator> DeletionWorker<G> {
    /// Runs until `shutdown` fires or every queue handle is dropped.
    ///
    /// On shutdown the queue stops accepting requests and whatever was
    /// already queued is still applied.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!("deletion worker started");

        loop {
            tokio::select! {
                request = self.receiver.recv() => match request {
                    Some(request) => self.process(request).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    self.receiver.close();
                    while let Some(request) = self.receiver.recv().await {
                        self.process(request).await;
                    }
                    break;
                }
            }
        }

        info!("deletion worker stopped");
    }

    async fn process(&self, request: DeletionRequest) {
        let owner = match self.resolver.owner_of(&request.owner_token).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!(error = %e, codes = request.codes.len(), "dropping deletion request");
                return;
            }
        };

        match self.registry.delete_batch(owner, &request.codes).await {
            Ok(flagged) => debug!(
                owner = %owner,
                requested = request.codes.len(),
                flagged,
                "applied deletion request"
            ),
            Err(e) => error!(owner = %owner, error = %e, "deletion request failed"),
        }
    }
}

/// A running deletion worker together with its queue.
pub struct DeletionPipeline {
    queue: DeletionQueue,
    shutdown: Option<oneshot::Sender<()>>,
    worker: JoinHandle<()>,
}

impl DeletionPipeline {
    /// Spawns the worker on the current runtime.
    pub fn spawn<G: Generator>(
        capacity: usize,
        registry: Registry<G>,
        resolver: IdentityResolver,
    ) -> Self {
        let (queue, worker) = DeletionQueue::channel(capacity, registry, resolver);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(worker.run(shutdown_rx));

        Self {
            queue,
            shutdown: Some(shutdown_tx),
            worker,
        }
    }

    pub fn queue(&self) -> DeletionQueue {
        self.queue.clone()
    }

    /// Stops accepting requests and waits for the queued ones to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Err(e) = self.worker.await {
            error!(error = %e, "deletion worker panicked");
        }
    }
}
