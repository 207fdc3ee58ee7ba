use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};

use crate::config::PlantDescriptor;
use crate::election::state::{PlantState, PlantStatus};

/// Concurrency shell around [`PlantState`]: one coordination mutex per plant,
/// plus a watch channel that publishes the topology-mutation flag so election
/// steps can wait for neighbor swaps to settle without busy-looping.
pub struct SharedPlant {
    state: Mutex<PlantState>,
    topology_busy_tx: watch::Sender<bool>,
}

impl SharedPlant {
    pub fn new(descriptor: PlantDescriptor) -> Arc<Self> {
        let (topology_busy_tx, _) = watch::channel(false);
        Arc::new(Self {
            state: Mutex::new(PlantState::new(descriptor)),
            topology_busy_tx,
        })
    }

    /// Plain lock, used by topology writers and status readers.
    pub async fn lock(&self) -> MutexGuard<'_, PlantState> {
        self.state.lock().await
    }

    /// Lock for an election step: blocks while a topology mutation is in
    /// flight, so bids are never compared against a half-updated ring.
    pub async fn lock_settled(&self) -> MutexGuard<'_, PlantState> {
        let mut busy_rx = self.topology_busy_tx.subscribe();
        loop {
            {
                let guard = self.state.lock().await;
                if !guard.topology_in_flight {
                    return guard;
                }
                // Mark the current flag value seen while the state lock still
                // excludes writers; any mutation finishing after this point
                // bumps the watch version and wakes the `changed` below.
                busy_rx.borrow_and_update();
            }
            if busy_rx.changed().await.is_err() {
                // Sender lives as long as self; treat closure as settled.
                return self.state.lock().await;
            }
        }
    }

    /// Run a neighbor mutation under the topology gate. The flag is raised
    /// and lowered inside one critical section: mutations are brief
    /// single-field swaps, the gate exists so concurrent election steps
    /// observe either the old ring or the new one, never a mix.
    pub async fn mutate_topology<R>(&self, f: impl FnOnce(&mut PlantState) -> R) -> R {
        let mut guard = self.state.lock().await;
        guard.topology_in_flight = true;
        let _ = self.topology_busy_tx.send(true);
        let result = f(&mut guard);
        guard.topology_in_flight = false;
        let _ = self.topology_busy_tx.send(false);
        result
    }

    pub async fn is_alone(&self) -> bool {
        self.state.lock().await.is_alone()
    }

    pub async fn status(&self) -> PlantStatus {
        self.state.lock().await.status
    }

    /// Consistent next/prev snapshot.
    pub async fn neighbors(&self) -> (Option<PlantDescriptor>, Option<PlantDescriptor>) {
        let guard = self.state.lock().await;
        (guard.next.clone(), guard.prev.clone())
    }
}
