use super::*;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use shared::protocol::{HubEvent, OnlineUsersPayload};

fn online_event(users: &[&str]) -> HubEvent {
    HubEvent::OnlineUsersUpdate(OnlineUsersPayload {
        online_users: users.iter().map(|s| s.to_string()).collect(),
    })
}

fn custom_event(name: &str) -> HubEvent {
    HubEvent::Custom {
        name: name.into(),
        data: serde_json::Value::Null,
    }
}

#[test]
fn every_registered_handler_runs_exactly_once_per_publish() {
    let bus = EventBus::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    {
        let first = Arc::clone(&first);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let second = Arc::clone(&second);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            second.fetch_add(1, Ordering::SeqCst);
        });
    }

    bus.publish(&online_event(&["1_a_user"]));
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    bus.publish(&online_event(&["2_b_user"]));
    assert_eq!(first.load(Ordering::SeqCst), 2);
    assert_eq!(second.load(Ordering::SeqCst), 2);
}

#[test]
fn handlers_run_in_registration_order() {
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            order.lock().unwrap().push(label);
        });
    }

    bus.publish(&online_event(&[]));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn events_route_by_key() {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));

    {
        let hits = Arc::clone(&hits);
        bus.subscribe(EventKey::Custom("typing".into()), move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    bus.publish(&online_event(&[]));
    bus.publish(&custom_event("other"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    bus.publish(&custom_event("typing"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribed_handler_is_never_invoked_again() {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let id = {
        let hits = Arc::clone(&hits);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    };

    bus.publish(&online_event(&[]));
    assert!(bus.unsubscribe(id));
    bus.publish(&online_event(&[]));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.listener_count(&EventKey::OnlineUsersUpdate), 0);
}

#[test]
fn double_unsubscribe_is_a_no_op() {
    let bus = EventBus::new();
    let id = bus.subscribe(EventKey::OnlineUsersUpdate, |_| {});
    assert!(bus.unsubscribe(id));
    assert!(!bus.unsubscribe(id));
    assert!(!bus.unsubscribe(9999));
}

#[test]
fn handler_unsubscribing_a_sibling_mid_dispatch_suppresses_it() {
    let bus = Arc::new(EventBus::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    let victim_id = Arc::new(Mutex::new(None));

    {
        let bus_in_handler = Arc::clone(&bus);
        let order = Arc::clone(&order);
        let victim_id = Arc::clone(&victim_id);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            order.lock().unwrap().push("assassin");
            if let Some(id) = victim_id.lock().unwrap().take() {
                bus_in_handler.unsubscribe(id);
            }
        });
    }
    {
        let order = Arc::clone(&order);
        let id = bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            order.lock().unwrap().push("victim");
        });
        *victim_id.lock().unwrap() = Some(id);
    }

    // The victim was registered when publish started but unsubscribed during
    // dispatch of this very event, so it must not run.
    bus.publish(&online_event(&[]));
    assert_eq!(*order.lock().unwrap(), vec!["assassin"]);

    bus.publish(&online_event(&[]));
    assert_eq!(*order.lock().unwrap(), vec!["assassin", "assassin"]);
}

#[test]
fn handler_may_unsubscribe_itself_during_its_own_dispatch() {
    let bus = Arc::new(EventBus::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let own_id = Arc::new(Mutex::new(None));

    let id = {
        let bus_in_handler = Arc::clone(&bus);
        let hits = Arc::clone(&hits);
        let own_id = Arc::clone(&own_id);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = own_id.lock().unwrap().take() {
                bus_in_handler.unsubscribe(id);
            }
        })
    };
    *own_id.lock().unwrap() = Some(id);

    bus.publish(&online_event(&[]));
    bus.publish(&online_event(&[]));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_handler_does_not_stop_siblings_or_the_publisher() {
    let bus = EventBus::new();
    let survivor = Arc::new(AtomicUsize::new(0));

    bus.subscribe(EventKey::OnlineUsersUpdate, |_| {
        panic!("listener blew up");
    });
    {
        let survivor = Arc::clone(&survivor);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
            survivor.fetch_add(1, Ordering::SeqCst);
        });
    }

    bus.publish(&online_event(&[]));
    assert_eq!(survivor.load(Ordering::SeqCst), 1);

    // The registry is still usable afterwards.
    bus.publish(&online_event(&[]));
    assert_eq!(survivor.load(Ordering::SeqCst), 2);
}

#[test]
fn publish_without_listeners_is_fine() {
    let bus = EventBus::new();
    bus.publish(&online_event(&["1_a_user"]));
    bus.publish(&custom_event("nobody_listens"));
}

#[test]
fn concurrent_subscribe_publish_unsubscribe_do_not_require_coordination() {
    let bus = Arc::new(EventBus::new());
    let hits = Arc::new(AtomicUsize::new(0));

    let publisher = {
        let bus = Arc::clone(&bus);
        std::thread::spawn(move || {
            for _ in 0..200 {
                bus.publish(&online_event(&["1_a_user"]));
            }
        })
    };
    let churner = {
        let bus = Arc::clone(&bus);
        let hits = Arc::clone(&hits);
        std::thread::spawn(move || {
            for _ in 0..200 {
                let hits = Arc::clone(&hits);
                let id = bus.subscribe(EventKey::OnlineUsersUpdate, move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
                bus.unsubscribe(id);
            }
        })
    };

    publisher.join().expect("publisher");
    churner.join().expect("churner");
    assert_eq!(bus.listener_count(&EventKey::OnlineUsersUpdate), 0);
}
