//! Queue flow specs
//!
//! Verify resource creation, subscription, and the join/accept/release
//! cycle as observed over the socket.

use crate::prelude::*;

#[test]
fn create_resource_returns_distinct_ids() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();

    let first = create_resource(&mut session, "staging", 30);
    let second = create_resource(&mut session, "ci-runner", 30);
    assert_ne!(first, second);
}

#[test]
fn create_with_empty_name_is_rejected() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();

    let response = session.request(&Request::CreateResource {
        name: "  ".to_string(),
        description: None,
        timeout_seconds: 30,
    });
    match response {
        Response::Rejected { kind, .. } => assert_eq!(kind, "malformed_payload"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[test]
fn create_with_zero_timeout_is_rejected() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();

    let response = session.request(&Request::CreateResource {
        name: "staging".to_string(),
        description: None,
        timeout_seconds: 0,
    });
    match response {
        Response::Rejected { kind, .. } => assert_eq!(kind, "malformed_payload"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[test]
fn subscribe_returns_current_state() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 30);

    let response = session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });
    match response {
        Response::Subscribed { state } => {
            assert_eq!(state.resource_id, resource_id);
            assert_eq!(state.timeout_seconds, 30);
            assert!(state.holder.is_none());
            assert!(state.queue.is_empty());
        }
        other => panic!("expected Subscribed, got {:?}", other),
    }
}

#[test]
fn subscribe_to_unknown_resource_is_rejected() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();

    let response = session.request(&Request::JoinResource {
        resource_id: "ghost".to_string(),
    });
    match response {
        Response::Rejected { kind, .. } => assert_eq!(kind, "unknown_resource"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[test]
fn first_joiner_is_offered_the_resource() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 30);
    session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    let alice = join_queue(&mut session, &resource_id, "alice");

    let state = session.update_where(|s| s.queue.iter().any(|w| w.is_offered));
    assert_eq!(state.queue[0].user_id, alice);
    assert_eq!(state.queue[0].display_name, "alice");
    assert!(state.offer_expires_at.is_some());
}

#[test]
fn accept_then_release_passes_to_next_in_order() {
    let fixture = DaemonFixture::start();
    let mut alice_session = fixture.connect();
    let mut bob_session = fixture.connect();

    let resource_id = create_resource(&mut alice_session, "staging", 30);
    alice_session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    let alice = join_queue(&mut alice_session, &resource_id, "alice");
    let bob = join_queue(&mut bob_session, &resource_id, "bob");

    let accepted = alice_session.request(&Request::AcceptOffer {
        resource_id: resource_id.clone(),
        identity: alice,
    });
    assert_eq!(accepted, Response::Ok);

    let state = alice_session.update_where(|s| s.holder.is_some());
    assert_eq!(state.holder.expect("holder set").user_id, alice);

    let released = alice_session.request(&Request::ReleaseResource {
        resource_id: resource_id.clone(),
        identity: alice,
    });
    assert_eq!(released, Response::Ok);

    let state = alice_session
        .update_where(|s| s.holder.is_none() && s.queue.iter().any(|w| w.is_offered));
    assert_eq!(state.queue[0].user_id, bob);
}

#[test]
fn observer_sees_other_clients_transitions() {
    let fixture = DaemonFixture::start();
    let mut actor = fixture.connect();
    let mut observer = fixture.connect();

    let resource_id = create_resource(&mut actor, "staging", 30);
    observer.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    let alice = join_queue(&mut actor, &resource_id, "alice");
    actor.request(&Request::AcceptOffer {
        resource_id: resource_id.clone(),
        identity: alice,
    });

    let state = observer.update_where(|s| s.holder.is_some());
    assert_eq!(state.holder.expect("holder set").display_name, "alice");
}

#[test]
fn late_subscriber_is_brought_current_and_stays_live() {
    let fixture = DaemonFixture::start();
    let mut actor = fixture.connect();
    let resource_id = create_resource(&mut actor, "staging", 30);

    let alice = join_queue(&mut actor, &resource_id, "alice");
    actor.request(&Request::AcceptOffer {
        resource_id: resource_id.clone(),
        identity: alice,
    });

    // A connection subscribing only now must see the post-transition state,
    // not the resource as it was created
    let mut late = fixture.connect();
    let state = match late.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    }) {
        Response::Subscribed { state } => state,
        other => panic!("expected Subscribed, got {:?}", other),
    };
    assert_eq!(state.holder.as_ref().expect("holder set").user_id, alice);

    // and its receiver is live for transitions after the subscribe
    actor.request(&Request::ReleaseResource {
        resource_id,
        identity: alice,
    });
    let state = late.update_where(|s| s.holder.is_none());
    assert!(state.queue.is_empty());
}

#[test]
fn rejoining_with_issued_identity_is_idempotent() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 30);

    let alice = join_queue(&mut session, &resource_id, "alice");

    // A reconnecting client presents its identity and keeps its position
    let mut reconnected = fixture.connect();
    let response = reconnected.request(&Request::JoinQueue {
        resource_id: resource_id.clone(),
        display_name: "alice".to_string(),
        identity: Some(alice),
    });
    match response {
        Response::Joined { identity, .. } => assert_eq!(identity, alice),
        other => panic!("expected Joined, got {:?}", other),
    }

    let state = match reconnected.request(&Request::JoinResource { resource_id }) {
        Response::Subscribed { state } => state,
        other => panic!("expected Subscribed, got {:?}", other),
    };
    assert_eq!(state.queue.len(), 1);
}

#[test]
fn leaving_removes_waiter_from_queue() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 30);
    session.request(&Request::JoinResource {
        resource_id: resource_id.clone(),
    });

    let alice = join_queue(&mut session, &resource_id, "alice");
    let bob = join_queue(&mut session, &resource_id, "bob");

    let response = session.request(&Request::LeaveQueue {
        resource_id: resource_id.clone(),
        identity: bob,
    });
    assert_eq!(response, Response::Ok);

    let state = session.update_where(|s| s.queue.len() == 1);
    assert_eq!(state.queue[0].user_id, alice);
}

#[test]
fn release_by_non_holder_is_rejected() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 30);

    let alice = join_queue(&mut session, &resource_id, "alice");

    // alice is offered but has not accepted; she holds nothing to release
    let response = session.request(&Request::ReleaseResource {
        resource_id,
        identity: alice,
    });
    match response {
        Response::Rejected { kind, .. } => assert_eq!(kind, "identity_mismatch"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[test]
fn empty_display_name_is_rejected() {
    let fixture = DaemonFixture::start();
    let mut session = fixture.connect();
    let resource_id = create_resource(&mut session, "staging", 30);

    let response = session.request(&Request::JoinQueue {
        resource_id,
        display_name: "".to_string(),
        identity: None,
    });
    match response {
        Response::Rejected { kind, .. } => assert_eq!(kind, "malformed_payload"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}
