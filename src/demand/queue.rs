use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::demand::request::DemandRequest;

/// Demands this plant has heard about but not yet turned into its own
/// election. Fed by the demand stream, drained oldest-first by the
/// initiator, purged whenever an election for a request terminates anywhere
/// in the ring.
///
/// The initiator is the only consumer, so `Notify`'s stored-permit semantics
/// make `take` race-free against concurrent `put`s.
pub struct DemandQueue {
    requests: Mutex<Vec<DemandRequest>>,
    available: Notify,
}

impl Default for DemandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DemandQueue {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            available: Notify::new(),
        }
    }

    pub async fn put(&self, request: DemandRequest) {
        let mut requests = self.requests.lock().await;
        requests.push(request);
        self.available.notify_one();
    }

    /// Remove every queued demand with this id. A no-op when the id is not
    /// queued, which is the common case for claims this plant already saw.
    pub async fn remove_by_id(&self, request_id: Uuid) -> bool {
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|r| r.id != request_id);
        let removed = requests.len() < before;
        if removed {
            tracing::debug!(request_id = %request_id, "Demand purged from outbound queue");
        }
        removed
    }

    /// Take the oldest demand, waiting until one is queued.
    pub async fn take(&self) -> DemandRequest {
        loop {
            let notified = self.available.notified();
            {
                let mut requests = self.requests.lock().await;
                if let Some(index) = Self::oldest_index(&requests) {
                    return requests.swap_remove(index);
                }
            }
            notified.await;
        }
    }

    pub async fn len(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.lock().await.is_empty()
    }

    fn oldest_index(requests: &[DemandRequest]) -> Option<usize> {
        requests
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| r.created_at)
            .map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    fn demand_at_offset(secs: i64, amount: f64) -> DemandRequest {
        DemandRequest::with_id(
            Uuid::new_v4(),
            Utc::now() + ChronoDuration::seconds(secs),
            amount,
        )
    }

    #[tokio::test]
    async fn take_returns_oldest_first() {
        let queue = DemandQueue::new();
        let older = demand_at_offset(-10, 100.0);
        let newer = demand_at_offset(0, 200.0);
        let older_id = older.id;

        queue.put(newer).await;
        queue.put(older).await;

        assert_eq!(queue.take().await.id, older_id);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn remove_by_id_purges_all_copies() {
        let queue = DemandQueue::new();
        let demand = demand_at_offset(0, 100.0);
        let id = demand.id;
        queue.put(demand.clone()).await;
        queue.put(demand).await;
        queue.put(demand_at_offset(1, 50.0)).await;

        assert!(queue.remove_by_id(id).await);
        assert_eq!(queue.len().await, 1);
        assert!(!queue.remove_by_id(id).await);
    }

    #[tokio::test]
    async fn take_blocks_until_put() {
        let queue = Arc::new(DemandQueue::new());

        let taker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!taker.is_finished(), "take resolved on an empty queue");

        let demand = demand_at_offset(0, 75.0);
        let id = demand.id;
        queue.put(demand).await;

        let taken = tokio::time::timeout(Duration::from_secs(1), taker)
            .await
            .expect("take should resolve after put")
            .unwrap();
        assert_eq!(taken.id, id);
    }
}
