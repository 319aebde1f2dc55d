mod common;

use std::sync::{Arc, Mutex};

use common::{TRANSFER, drain, settle, setup_watcher, sink};
use event_watcher::{
    SubscriptionGuard,
    test_utils::{self, MockTransport},
};

#[tokio::test(start_paused = true)]
async fn shared_contract_key_uses_single_watch() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let address = test_utils::address(0xaa);
    let label = MockTransport::log_label(address, TRANSFER);

    let first_seen = sink::<u64>();
    let second_seen = sink::<u64>();

    let first = {
        let seen = first_seen.clone();
        watcher.on_contract_event(
            address,
            TRANSFER,
            move |log| seen.lock().unwrap().push(log.block_number.unwrap()),
            Default::default(),
        )
    };
    let second = {
        let seen = second_seen.clone();
        watcher.on_contract_event(
            address,
            TRANSFER,
            move |log| seen.lock().unwrap().push(log.block_number.unwrap()),
            Default::default(),
        )
    };
    settle().await;

    // Two registrations, one transport watch.
    assert_eq!(mock.watch_count(&label), 1);
    assert_eq!(mock.active_watches(), 1);

    mock.push_log(address, TRANSFER, test_utils::log(address, 5, 0));
    settle().await;
    assert_eq!(drain(&first_seen), vec![5]);
    assert_eq!(drain(&second_seen), vec![5]);

    // One listener leaving keeps the watch alive.
    first.unsubscribe();
    settle().await;
    assert_eq!(mock.active_watches(), 1);

    mock.push_log(address, TRANSFER, test_utils::log(address, 6, 0));
    settle().await;
    assert_eq!(drain(&first_seen), vec![5]);
    assert_eq!(drain(&second_seen), vec![5, 6]);

    // The last listener leaving stops it.
    second.unsubscribe();
    settle().await;
    assert_eq!(mock.active_watches(), 0);
    assert_eq!(mock.watch_count(&label), 1);
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_get_distinct_watches() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let address = test_utils::address(0xaa);

    let _blocks = watcher.on_block(|_| {});
    let _logs = watcher.on_contract_event(address, TRANSFER, |_| {}, Default::default());
    settle().await;

    assert_eq!(mock.active_watches(), 2);
    assert_eq!(mock.watch_count("block"), 1);
    assert_eq!(mock.watch_count(&MockTransport::log_label(address, TRANSFER)), 1);
}

#[tokio::test(start_paused = true)]
async fn block_events_are_delivered_in_order() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let seen = sink::<u64>();

    let _guard = {
        let seen = seen.clone();
        watcher.on_block(move |header| seen.lock().unwrap().push(header.inner.number))
    };
    settle().await;

    for number in 1..=5 {
        mock.push_block(test_utils::header(number));
    }
    settle().await;

    assert_eq!(drain(&seen), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn panicking_listener_does_not_affect_others() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let seen = sink::<u64>();

    let _bad = watcher.on_block(|_| panic!("listener bug"));
    let _good = {
        let seen = seen.clone();
        watcher.on_block(move |header| seen.lock().unwrap().push(header.inner.number))
    };
    settle().await;

    mock.push_block(test_utils::header(1));
    mock.push_block(test_utils::header(2));
    settle().await;

    assert_eq!(drain(&seen), vec![1, 2]);
    // The watch itself stays healthy.
    assert_eq!(mock.active_watches(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribing_a_peer_mid_delivery_spares_the_current_round() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let peer_slot: Arc<Mutex<Option<SubscriptionGuard<MockTransport>>>> =
        Arc::new(Mutex::new(None));
    let killer_seen = sink::<u64>();
    let peer_seen = sink::<u64>();

    // This listener removes its peer from inside a delivery.
    let _killer = {
        let slot = peer_slot.clone();
        let seen = killer_seen.clone();
        watcher.on_block(move |header| {
            seen.lock().unwrap().push(header.inner.number);
            if let Some(peer) = slot.lock().unwrap().take() {
                peer.unsubscribe();
            }
        })
    };
    let peer = {
        let seen = peer_seen.clone();
        watcher.on_block(move |header| seen.lock().unwrap().push(header.inner.number))
    };
    *peer_slot.lock().unwrap() = Some(peer);
    settle().await;

    // The snapshot for this round was taken before the removal, so both listeners get the
    // event regardless of delivery order.
    mock.push_block(test_utils::header(1));
    settle().await;
    assert_eq!(drain(&killer_seen), vec![1]);
    assert_eq!(drain(&peer_seen), vec![1]);

    // From the next round on the peer is gone.
    mock.push_block(test_utils::header(2));
    settle().await;
    assert_eq!(drain(&killer_seen), vec![1, 2]);
    assert_eq!(drain(&peer_seen), vec![1]);
    assert_eq!(mock.active_watches(), 1);
}

#[tokio::test(start_paused = true)]
async fn pending_transactions_are_hydrated() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let known = alloy::primitives::B256::repeat_byte(0x01);
    let unknown = alloy::primitives::B256::repeat_byte(0x02);
    mock.insert_transaction(known, test_utils::transaction(known));

    let seen = sink::<()>();
    let _guard = {
        let seen = seen.clone();
        watcher.on_transaction(move |_tx| seen.lock().unwrap().push(()))
    };
    settle().await;

    mock.push_pending(known);
    settle().await;
    assert_eq!(drain(&seen).len(), 1);

    // A hash the node cannot resolve is skipped.
    mock.push_pending(unknown);
    settle().await;
    assert_eq!(drain(&seen).len(), 1);

    // A failed lookup is skipped too, without killing the watch.
    mock.fail_next_transaction_lookups(1);
    mock.push_pending(known);
    settle().await;
    assert_eq!(drain(&seen).len(), 1);
    assert_eq!(mock.active_watches(), 1);

    mock.push_pending(known);
    settle().await;
    assert_eq!(drain(&seen).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn off_contract_event_scopes_by_address_and_event() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let target = test_utils::address(0xaa);
    let other = test_utils::address(0xbb);

    let _transfer = watcher.on_contract_event(target, TRANSFER, |_| {}, Default::default());
    let _approval = watcher.on_contract_event(target, common::APPROVAL, |_| {}, Default::default());
    let _elsewhere = watcher.on_contract_event(other, TRANSFER, |_| {}, Default::default());
    settle().await;
    assert_eq!(mock.active_watches(), 3);

    // Clearing every event for one address leaves the other contract alone.
    watcher.off_contract_event(target, None);
    settle().await;
    assert_eq!(mock.active_watches(), 1);

    watcher.off_contract_event(other, Some(TRANSFER));
    settle().await;
    assert_eq!(mock.active_watches(), 0);
}

#[tokio::test(start_paused = true)]
async fn off_block_stops_the_block_watch() {
    let (watcher, mock) = setup_watcher(1000, 3);
    let seen = sink::<u64>();

    let _first = {
        let seen = seen.clone();
        watcher.on_block(move |header| seen.lock().unwrap().push(header.inner.number))
    };
    let _second = watcher.on_block(|_| {});
    settle().await;
    assert_eq!(mock.active_watches(), 1);

    watcher.off_block();
    settle().await;
    assert_eq!(mock.active_watches(), 0);

    mock.push_block(test_utils::header(9));
    settle().await;
    assert!(drain(&seen).is_empty());
}
