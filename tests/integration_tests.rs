//! End-to-end tests over real gRPC: admin + plant nodes in one process.
//!
//! Port ranges are unique per test so the suites can run in parallel.


use gridring::node::PlantNode;
use test_harness::{node_status, TestNet};

#[tokio::test]
async fn lone_plant_resolves_demands_without_the_ring() {
    let net = TestNet::start(18080).await;
    net.start_plant("1", 18081).await;

    let request_id = net.submit_demand(200.0).await;

    net.wait_until("demand claimed by the lone plant", || async {
        net.demands()
            .await
            .iter()
            .any(|(id, claimed_by)| *id == request_id && claimed_by.as_deref() == Some("1"))
    })
    .await;

    net.wait_until("plant idle again", || async {
        match node_status(18081).await {
            Some(status) => status.status == "idle" && status.queued_demands == 0,
            None => false,
        }
    })
    .await;

    // The lone fast path never exchanges a single token.
    let status = node_status(18081).await.unwrap();
    assert_eq!(status.processed_requests, 0);
    assert_eq!(status.pending_tokens, 0);
    assert!(status.next_id.is_empty() && status.prev_id.is_empty());
}

#[tokio::test]
async fn introductions_link_three_plants_into_a_ring() {
    let net = TestNet::start(18090).await;

    net.start_plant("1", 18091).await;
    net.start_plant("2", 18092).await;
    // Plant 2 joins with registry neighbors pred=1, succ=1; the flood makes
    // plant 1 adopt it on both sides.
    net.wait_for_links(18091, "2", "2").await;

    net.start_plant("3", 18093).await;
    // Plant 3 sits between 2 and 1: the flood relinks 2.next and 1.prev.
    net.wait_for_links(18091, "2", "3").await;
    net.wait_for_links(18092, "3", "1").await;
    net.wait_for_links(18093, "1", "2").await;
}

#[tokio::test]
async fn every_demand_is_claimed_by_exactly_one_plant() {
    let net = TestNet::start(18100).await;

    net.start_plant("1", 18101).await;
    net.start_plant("2", 18102).await;
    net.wait_for_links(18101, "2", "2").await;
    net.start_plant("3", 18103).await;
    net.wait_for_links(18102, "3", "1").await;

    // Small amounts keep the simulated production in the tens of ms.
    let mut submitted = Vec::new();
    for amount in [60.0, 90.0, 120.0] {
        submitted.push(net.submit_demand(amount).await);
    }

    net.wait_until("all demands claimed", || async {
        let demands = net.demands().await;
        submitted.iter().all(|id| {
            demands
                .iter()
                .any(|(demand_id, claimed_by)| demand_id == id && claimed_by.is_some())
        })
    })
    .await;

    // The admin's book accepts only the first claim per demand, so a claim
    // on record is THE winner; every plant must eventually stand down.
    for port in [18101, 18102, 18103] {
        net.wait_until("plant drained", || async {
            match node_status(port).await {
                Some(status) => status.queued_demands == 0,
                None => false,
            }
        })
        .await;
    }
}

#[tokio::test]
async fn duplicate_plant_id_is_rejected_at_registration() {
    let net = TestNet::start(18110).await;
    net.start_plant("7", 18111).await;

    let config = net.plant_config("7", 18112);
    match PlantNode::bootstrap(config).await {
        Err(gridring::error::GridError::DuplicateId(id)) => assert_eq!(id, "7"),
        Err(other) => panic!("expected DuplicateId, got: {other}"),
        Ok(_) => panic!("duplicate id must not register"),
    }
}
