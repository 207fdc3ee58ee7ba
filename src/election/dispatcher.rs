use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::demand::DemandQueue;
use crate::election::coordinator::{ElectionCoordinator, Evaluated, Outcome};
use crate::election::shared::SharedPlant;
use crate::election::state::{ElectionToken, PlantStatus};
use crate::error::{GridError, Result};
use crate::production::{self, ProductionEnv};

/// Permit the initiator waits on before starting an election of its own.
/// The flag survives a permit granted while nobody is waiting.
pub struct StartSignal {
    permitted: std::sync::Mutex<bool>,
    notify: Notify,
}

impl StartSignal {
    fn new() -> Self {
        Self {
            permitted: std::sync::Mutex::new(false),
            notify: Notify::new(),
        }
    }

    pub fn permit(&self) {
        let mut permitted = self.permitted.lock().expect("start signal lock poisoned");
        *permitted = true;
        self.notify.notify_one();
    }

    pub async fn acquire(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let mut permitted = self.permitted.lock().expect("start signal lock poisoned");
                if std::mem::take(&mut *permitted) {
                    return;
                }
            }
            notified.await;
        }
    }
}

struct WorkItem {
    token: ElectionToken,
    reply_tx: oneshot::Sender<Evaluated>,
}

/// How a submitted token was admitted.
pub enum Submission {
    /// Assigned to the worker or queued; the receiver resolves once the
    /// token has been fully evaluated.
    Accepted(oneshot::Receiver<Evaluated>),
    /// Request id already terminated here, token ignored.
    AlreadyProcessed,
}

#[derive(Default)]
struct DispatcherInner {
    running: bool,
    worker_busy: bool,
    pending: VecDeque<WorkItem>,
    processed: HashSet<Uuid>,
    /// Requests that passed through while this plant was producing; purged
    /// from the outbound queue when production ends.
    seen_while_producing: Vec<Uuid>,
    duplicates_ignored: u64,
}

/// Snapshot of the dispatcher's bookkeeping for status reporting.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherStats {
    pub pending: usize,
    pub processed: usize,
    pub duplicates_ignored: u64,
}

/// Serializes token handling for one plant: a single worker slot fed by a
/// channel, a FIFO queue behind it, and the processed set guarding against
/// stray re-delivery. Tokens are never evaluated concurrently; order of
/// evaluation equals order of admission.
pub struct TokenDispatcher {
    inner: Mutex<DispatcherInner>,
    shared: Arc<SharedPlant>,
    demand_queue: Arc<DemandQueue>,
    work_tx: mpsc::Sender<WorkItem>,
    work_rx: std::sync::Mutex<Option<mpsc::Receiver<WorkItem>>>,
    start_signal: StartSignal,
}

impl TokenDispatcher {
    pub fn new(shared: Arc<SharedPlant>, demand_queue: Arc<DemandQueue>) -> Arc<Self> {
        let (work_tx, work_rx) = mpsc::channel(1);
        Arc::new(Self {
            inner: Mutex::new(DispatcherInner::default()),
            shared,
            demand_queue,
            work_tx,
            work_rx: std::sync::Mutex::new(Some(work_rx)),
            start_signal: StartSignal::new(),
        })
    }

    pub fn start_signal(&self) -> &StartSignal {
        &self.start_signal
    }

    /// Spawn the single handler worker. The initial start permit is granted
    /// here: a freshly started idle node may open an election as soon as a
    /// demand arrives.
    pub async fn start(
        self: &Arc<Self>,
        coordinator: Arc<ElectionCoordinator>,
        production_env: ProductionEnv,
        cancel: CancellationToken,
    ) {
        let receiver = {
            let mut slot = self.work_rx.lock().expect("work receiver lock poisoned");
            slot.take()
        };
        let Some(work_rx) = receiver else {
            tracing::warn!("Dispatcher already started");
            return;
        };

        self.inner.lock().await.running = true;

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher
                .worker_loop(coordinator, production_env, work_rx, cancel)
                .await;
        });

        self.start_signal.permit();
        tracing::info!("Token dispatcher started");
    }

    /// Admit an inbound token. Rejected outright when the dispatcher is not
    /// running; silently acked when the request id was already terminated
    /// here; otherwise assigned to the free worker slot or queued FIFO.
    pub async fn submit(&self, token: ElectionToken) -> Result<Submission> {
        // Read before taking the dispatcher lock: the production cycle locks
        // plant state first, then this dispatcher.
        let producing = self.shared.status().await == PlantStatus::Producing;

        let mut inner = self.inner.lock().await;
        if !inner.running {
            return Err(GridError::DispatcherStopped);
        }
        if inner.processed.contains(&token.request_id) {
            inner.duplicates_ignored += 1;
            tracing::info!(
                request_id = %token.request_id,
                sender_id = %token.sender_id,
                "Token for already-processed request ignored"
            );
            return Ok(Submission::AlreadyProcessed);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let item = WorkItem { token, reply_tx };

        if inner.worker_busy {
            inner.pending.push_back(item);
            tracing::debug!(pending = inner.pending.len(), "Worker busy, token queued");
        } else {
            inner.worker_busy = true;
            if producing {
                inner.seen_while_producing.push(item.token.request_id);
            }
            self.work_tx
                .try_send(item)
                .map_err(|_| GridError::Internal("worker slot out of sync".to_string()))?;
        }
        Ok(Submission::Accepted(reply_rx))
    }

    async fn worker_loop(
        self: Arc<Self>,
        coordinator: Arc<ElectionCoordinator>,
        production_env: ProductionEnv,
        mut work_rx: mpsc::Receiver<WorkItem>,
        cancel: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = work_rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let request_id = item.token.request_id;
            let evaluated = coordinator.process_token(&item.token).await;
            let terminal = evaluated.outcome == Outcome::Ended;
            let won = evaluated.won.clone();

            // The sender may have given up on the ack; processing stands.
            let _ = item.reply_tx.send(evaluated);

            if let Some(job) = won {
                production::spawn(production_env.clone(), job);
            }

            self.on_worker_idle(request_id, terminal).await;
        }
        self.inner.lock().await.running = false;
        tracing::info!("Token dispatcher worker stopped");
    }

    /// Bookkeeping after each evaluation: processed-set and outbound-queue
    /// maintenance, then either the next pending token or a start permit.
    async fn on_worker_idle(&self, request_id: Uuid, terminal: bool) {
        if terminal {
            self.inner.lock().await.processed.insert(request_id);
            self.demand_queue.remove_by_id(request_id).await;
        }

        let producing = self.shared.status().await == PlantStatus::Producing;
        let next = {
            let mut inner = self.inner.lock().await;
            match inner.pending.pop_front() {
                Some(item) => {
                    if producing {
                        inner.seen_while_producing.push(item.token.request_id);
                    }
                    Some(item)
                }
                None => {
                    inner.worker_busy = false;
                    None
                }
            }
        };

        match next {
            Some(item) => {
                // Someone else is running this election; it is not ours to
                // start independently.
                self.demand_queue.remove_by_id(item.token.request_id).await;
                if self.work_tx.send(item).await.is_err() {
                    tracing::error!("Worker channel closed while feeding pending token");
                }
            }
            None => self.maybe_permit_start().await,
        }
    }

    /// Production finished: purge the pass-through requests and re-check
    /// whether the initiator may start.
    pub async fn on_production_finished(&self) {
        let seen = {
            let mut inner = self.inner.lock().await;
            std::mem::take(&mut inner.seen_while_producing)
        };
        for request_id in seen {
            self.demand_queue.remove_by_id(request_id).await;
        }
        self.maybe_permit_start().await;
    }

    async fn maybe_permit_start(&self) {
        let idle = {
            let state = self.shared.lock().await;
            state.status == PlantStatus::Idle && state.current_request.is_none()
        };
        let quiet = {
            let inner = self.inner.lock().await;
            inner.pending.is_empty() && !inner.worker_busy
        };
        if idle && quiet {
            tracing::debug!("Node idle, permitting a new election");
            self.start_signal.permit();
        }
    }

    pub async fn stats(&self) -> DispatcherStats {
        let inner = self.inner.lock().await;
        DispatcherStats {
            pending: inner.pending.len(),
            processed: inner.processed.len(),
            duplicates_ignored: inner.duplicates_ignored,
        }
    }
}
