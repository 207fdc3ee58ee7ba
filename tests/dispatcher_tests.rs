//! Dispatcher admission and serialization: one token in flight, FIFO order,
//! duplicate and not-running rejection. The coordinator under test forwards
//! into the void (no successor), which only produces logged warnings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gridring::config::PlantDescriptor;
use gridring::demand::DemandQueue;
use gridring::election::state::{ElectionToken, TokenKind};
use gridring::election::{ElectionCoordinator, Outcome, SharedPlant, Submission, TokenDispatcher};
use gridring::error::GridError;
use gridring::grpc::{AdminLink, PlantClient};
use gridring::production::ProductionEnv;

struct Fixture {
    dispatcher: Arc<TokenDispatcher>,
    cancel: CancellationToken,
}

impl Fixture {
    async fn start(evaluation_delay_ms: u64) -> Self {
        let shared = SharedPlant::new(PlantDescriptor::new("1", 1, "127.0.0.1", 59999));
        let demand_queue = Arc::new(DemandQueue::new());
        let client = PlantClient::new(Duration::from_millis(200), Duration::from_millis(200));
        let coordinator = ElectionCoordinator::new(
            shared.clone(),
            client,
            Duration::from_millis(evaluation_delay_ms),
        );
        let dispatcher = TokenDispatcher::new(shared.clone(), demand_queue.clone());
        let cancel = CancellationToken::new();
        let env = ProductionEnv {
            shared,
            // Nothing listens here; claim failures are logged, not fatal.
            admin: AdminLink::new("http://127.0.0.1:1"),
            dispatcher: dispatcher.clone(),
        };
        dispatcher
            .start(coordinator, env, cancel.clone())
            .await;
        Self { dispatcher, cancel }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn token(sender: u64, request_id: Uuid, bid: f64) -> ElectionToken {
    ElectionToken::opening(
        &PlantDescriptor::new(sender.to_string(), sender, "127.0.0.1", 50000 + sender as u16),
        request_id,
        bid,
        1000.0,
    )
}

#[tokio::test]
async fn tokens_evaluate_serially_in_submission_order() {
    let fixture = Fixture::start(50).await;
    let k = 5;

    let started = Instant::now();
    let completions: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();

    for i in 0..k {
        let submission = fixture
            .dispatcher
            .submit(token(2, Uuid::new_v4(), 0.50))
            .await
            .expect("running dispatcher accepts tokens");
        let Submission::Accepted(reply_rx) = submission else {
            panic!("fresh request ids must be accepted");
        };
        let completions = completions.clone();
        waiters.push(tokio::spawn(async move {
            let evaluated = reply_rx.await.expect("worker answers every token");
            completions.lock().await.push(i);
            evaluated
        }));
    }

    for waiter in waiters {
        waiter.await.unwrap();
    }

    let order = completions.lock().await.clone();
    assert_eq!(order, (0..k).collect::<Vec<_>>(), "evaluation order != submission order");
    // Five evaluations at 50 ms each, one worker slot: never faster than
    // the serial sum.
    assert!(
        started.elapsed() >= Duration::from_millis(50 * k as u64),
        "tokens were evaluated concurrently"
    );
}

#[tokio::test]
async fn terminated_requests_are_ignored_on_redelivery() {
    let fixture = Fixture::start(0).await;
    let request_id = Uuid::new_v4();

    // A stray announcement for an untracked request terminates immediately.
    let mut stray = token(2, request_id, 0.10);
    stray.kind = TokenKind::Elected;

    let Submission::Accepted(reply_rx) = fixture.dispatcher.submit(stray.clone()).await.unwrap()
    else {
        panic!("first delivery must be evaluated");
    };
    let evaluated = reply_rx.await.unwrap();
    assert_eq!(evaluated.outcome, Outcome::Ended);

    // Same request id again: ignored without evaluation.
    match fixture.dispatcher.submit(stray).await.unwrap() {
        Submission::AlreadyProcessed => {}
        Submission::Accepted(_) => panic!("processed request must not be re-evaluated"),
    }

    let stats = fixture.dispatcher.stats().await;
    assert_eq!(stats.duplicates_ignored, 1);
    assert_eq!(stats.processed, 1);
}

#[tokio::test]
async fn stopped_dispatcher_rejects_tokens() {
    let shared = SharedPlant::new(PlantDescriptor::new("1", 1, "127.0.0.1", 59998));
    let dispatcher = TokenDispatcher::new(shared, Arc::new(DemandQueue::new()));

    let result = dispatcher.submit(token(2, Uuid::new_v4(), 0.50)).await;
    assert!(matches!(result, Err(GridError::DispatcherStopped)));
}

#[tokio::test]
async fn queued_tokens_report_in_pending_stats() {
    let fixture = Fixture::start(100).await;

    let first = fixture
        .dispatcher
        .submit(token(2, Uuid::new_v4(), 0.50))
        .await
        .unwrap();
    let second = fixture
        .dispatcher
        .submit(token(3, Uuid::new_v4(), 0.60))
        .await
        .unwrap();

    let stats = fixture.dispatcher.stats().await;
    assert_eq!(stats.pending, 1, "second token should queue behind the worker");

    for submission in [first, second] {
        if let Submission::Accepted(reply_rx) = submission {
            reply_rx.await.unwrap();
        }
    }
    assert_eq!(fixture.dispatcher.stats().await.pending, 0);
}
