//! Offer timer specs
//!
//! Verify the countdown attached to each offer: expiry passes the resource
//! on, acceptance stops the clock, and stale responses are harmless.

use crate::prelude::*;

#[test]
fn expired_offer_passes_to_next_waiter() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 1);
    session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    let alice = join_queue(&mut session, &resource_id, "alice");
    let bob = join_queue(&mut session, &resource_id, "bob");

    // alice never responds; after the 1s countdown bob is offered
    let state = session.update_where(|s| {
        s.queue.len() == 1 && s.queue[0].user_id == bob && s.queue[0].is_offered
    });
    assert!(!state.queue.iter().any(|w| w.user_id == alice));
    assert!(state.offer_expires_at.is_some());
}

#[test]
fn expired_offer_with_no_waiters_leaves_resource_idle() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 1);
    session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    join_queue(&mut session, &resource_id, "alice");

    let state = session.update_where(|s| s.queue.is_empty());
    assert!(state.holder.is_none());
    assert!(state.offer_expires_at.is_none());
}

#[test]
fn acceptance_before_expiry_stops_the_countdown() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 1);

    let alice = join_queue(&mut session, &resource_id, "alice");
    let accepted = session.request(&Request::AcceptOffer {
        resource_id: resource_id.clone(),
        identity: alice,
    });
    assert_eq!(accepted, Response::Ok);

    // Well past the original expiry, alice still holds the resource
    std::thread::sleep(std::time::Duration::from_millis(1500));
    let state = match session.request(&Request::JoinResource { resource_id }) {
        Response::Subscribed { state } => state,
        other => panic!("expected Subscribed, got {:?}", other),
    };
    assert_eq!(state.holder.expect("holder kept").user_id, alice);
    assert!(state.offer_expires_at.is_none());
}

#[test]
fn stale_accept_after_expiry_is_silently_ignored() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 1);
    session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    let alice = join_queue(&mut session, &resource_id, "alice");
    let bob = join_queue(&mut session, &resource_id, "bob");

    // Wait until the offer has moved on to bob
    session.update_where(|s| s.queue.len() == 1 && s.queue[0].user_id == bob);

    // alice's accept raced the expiry and lost; she gets a plain Ok
    let response = session.request(&Request::AcceptOffer {
        resource_id: resource_id.clone(),
        identity: alice,
    });
    assert_eq!(response, Response::Ok);

    // and bob's offer is untouched
    let state = match session.request(&Request::JoinResource { resource_id }) {
        Response::Subscribed { state } => state,
        other => panic!("expected Subscribed, got {:?}", other),
    };
    assert_eq!(state.queue[0].user_id, bob);
    assert!(state.queue[0].is_offered);
}

#[test]
fn rejected_offer_passes_on_without_waiting_for_expiry() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 30);
    session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    let alice = join_queue(&mut session, &resource_id, "alice");
    let bob = join_queue(&mut session, &resource_id, "bob");

    let response = session.request(&Request::RejectOffer {
        resource_id,
        identity: alice,
    });
    assert_eq!(response, Response::Ok);

    let state = session.update_where(|s| s.queue.len() == 1 && s.queue[0].is_offered);
    assert_eq!(state.queue[0].user_id, bob);
    assert!(!state.queue.iter().any(|w| w.user_id == alice));
}
