//! Watch behaviour against live block production.

use std::time::Duration;

use daolink::actions::proposals_from;
use tokio::time::timeout;

use crate::{TestNet, addr};

#[tokio::test]
async fn new_blocks_refire_the_watch() {
    use tokio_stream::StreamExt;

    let net = TestNet::new();
    let client = net.connect(addr(1));

    let watch = client.watch_proposals().unwrap();
    let mut snapshots = std::pin::pin!(watch.into_stream());
    assert!(snapshots.next().await.unwrap().is_loading);
    let initial = snapshots.next().await.unwrap();
    assert_eq!(proposals_from(initial.value.unwrap()).unwrap().len(), 0);

    // State changes on chain; the block carrying them re-fires the watch.
    let mut progress = client
        .create_cross_chain_proposal(addr(1), "0b", 1, 100_000, 0, None)
        .unwrap();
    progress.wait_for_terminal().await;

    let snapshot = timeout(Duration::from_secs(1), snapshots.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(proposals_from(snapshot.value.unwrap()).unwrap().len(), 1);
}

#[tokio::test]
async fn watches_share_one_block_subscription() {
    let net = TestNet::new();
    let client = net.connect(addr(1));

    let mut membership = client.watch_has_voter(addr(1)).unwrap();
    let mut proposals = client.watch_proposals().unwrap();
    // Drain each watch's loading placeholder and initial snapshot.
    membership.recv().await.unwrap();
    membership.recv().await.unwrap();
    proposals.recv().await.unwrap();
    proposals.recv().await.unwrap();

    // One produced block fans out to both watches.
    net.chain.produce_block();
    assert!(
        timeout(Duration::from_secs(1), membership.recv())
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        timeout(Duration::from_secs(1), proposals.recv())
            .await
            .unwrap()
            .is_some()
    );

    membership.unsubscribe().await;
    proposals.unsubscribe().await;
}

#[tokio::test]
async fn unsubscribed_watch_never_emits_again() {
    let net = TestNet::new();
    let client = net.connect(addr(1));

    let mut watch = client.watch_has_voter(addr(1)).unwrap();
    watch.recv().await.unwrap();
    watch.recv().await.unwrap();
    watch.unsubscribe().await;

    net.chain.produce_block();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Nothing to assert on the handle itself any more; the proof is that block production did not
    // panic a torn-down task and the other client paths still work.
    assert_eq!(client.get_name().await.value.as_deref(), Some("minidao"));
}

#[tokio::test]
async fn identical_specs_compare_equal_for_deduplication() {
    let net = TestNet::new();
    let client = net.connect(addr(1));

    let a = client.watch_has_voter(addr(1)).unwrap();
    let b = client.watch_has_voter(addr(1)).unwrap();
    let c = client.watch_has_voter(addr(2)).unwrap();

    assert_eq!(a.spec(), b.spec());
    assert_ne!(a.spec(), c.spec());

    a.unsubscribe().await;
    b.unsubscribe().await;
    c.unsubscribe().await;
}
