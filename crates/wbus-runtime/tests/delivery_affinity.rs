//! Integration tests: notifications reach handlers on the delivery context.
//!
//! Handlers subscribed to a bus bound to a [`DispatcherThread`] or a
//! [`DispatchQueue`] must run on that context no matter which thread calls
//! `notify`, and must run synchronously when `notify` is already on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::Level;
use wbus_core::{BusError, DeliveryContext, Handler, WeakNotificationBus};
use wbus_runtime::{
    CanExecuteChanged, Command, DelegateCommand, DispatchQueue, DispatcherConfig,
    DispatcherThread, PropertyNotifier, SourceId,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

fn start_dispatcher() -> DispatcherThread {
    DispatcherThread::start(&DispatcherConfig::default().with_thread_name("wbus-affinity"))
        .expect("spawn dispatcher")
}

/// Park the dispatcher until the returned sender fires (or is dropped).
fn hold(dispatcher: &DispatcherThread) -> mpsc::Sender<()> {
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    dispatcher.handle().post(Box::new(move || {
        let _ = started_tx.send(());
        let _ = gate_rx.recv_timeout(TIMEOUT);
    }));
    started_rx.recv_timeout(TIMEOUT).expect("dispatcher picked up gate");
    gate_tx
}

fn failing_handler(_: &u32, _: &u32) {
    panic!("handler failed on dispatcher");
}

#[test]
fn off_context_notify_is_posted_to_dispatcher() {
    init_tracing();
    let dispatcher = start_dispatcher();
    let bus: WeakNotificationBus<u32, &'static str> =
        WeakNotificationBus::new(dispatcher.context());

    let (tx, rx) = mpsc::channel::<(ThreadId, u32, &'static str)>();
    let handler: Handler<u32, &'static str> = Arc::new(move |sender: &u32, args: &&'static str| {
        let _ = tx.send((thread::current().id(), *sender, *args));
    });
    bus.subscribe(&handler);

    let gate = hold(&dispatcher);
    bus.notify(7, "changed");
    // Delivery is queued behind the gate, not run on this thread.
    assert!(rx.try_recv().is_err());

    gate.send(()).unwrap();
    let (thread_id, sender, args) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(thread_id, dispatcher.thread_id());
    assert_ne!(thread_id, thread::current().id());
    assert_eq!((sender, args), (7, "changed"));
}

#[test]
fn on_context_notify_runs_inline() {
    init_tracing();
    let dispatcher = start_dispatcher();
    let bus: Arc<WeakNotificationBus<(), ()>> =
        Arc::new(WeakNotificationBus::new(dispatcher.context()));

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let _sub = bus.subscribe_owned(move |_, _| flag.store(true, Ordering::SeqCst));

    let (tx, rx) = mpsc::channel();
    let remote_bus = Arc::clone(&bus);
    let remote_ran = Arc::clone(&ran);
    dispatcher.handle().post(Box::new(move || {
        remote_bus.notify((), ());
        let _ = tx.send(remote_ran.load(Ordering::SeqCst));
    }));

    assert!(rx.recv_timeout(TIMEOUT).unwrap(), "handler ran before notify returned");
}

#[test]
fn posted_handler_panic_is_reported_not_propagated() {
    init_tracing();
    let dispatcher = start_dispatcher();
    let bus: WeakNotificationBus<u32, u32> = WeakNotificationBus::new(dispatcher.context());
    let handler: Handler<u32, u32> = Arc::new(failing_handler);
    bus.subscribe(&handler);

    // Returns normally: the failure happens on the dispatcher.
    bus.notify(1, 2);

    let (done_tx, done_rx) = mpsc::channel();
    dispatcher.handle().post(Box::new(move || {
        let _ = done_tx.send(());
    }));
    done_rx.recv_timeout(TIMEOUT).unwrap();

    assert_eq!(
        dispatcher.check_error(),
        Some(BusError::HandlerFailure {
            message: "handler failed on dispatcher".into()
        })
    );
}

#[test]
fn queue_delivers_only_when_pumped_by_owner() {
    init_tracing();
    let queue = DispatchQueue::for_current_thread();
    let bus: Arc<WeakNotificationBus<SourceId, u64>> =
        Arc::new(WeakNotificationBus::new(queue.context()));

    let (tx, rx) = mpsc::channel::<(ThreadId, u64)>();
    let _sub = bus.subscribe_owned(move |_, value| {
        let _ = tx.send((thread::current().id(), *value));
    });

    let remote = Arc::clone(&bus);
    thread::spawn(move || {
        let source = SourceId::next();
        for value in 0..4 {
            remote.notify(source, value);
        }
    })
    .join()
    .unwrap();

    assert!(rx.try_recv().is_err());
    assert_eq!(queue.pending(), 4);

    let report = queue.run_pending();
    assert_eq!(report.executed, 4);
    assert!(report.is_clean());

    let delivered: Vec<(ThreadId, u64)> = rx.try_iter().collect();
    let owner = thread::current().id();
    assert_eq!(delivered, (0..4).map(|v| (owner, v)).collect::<Vec<_>>());
}

#[test]
fn command_listeners_hear_from_dispatcher() {
    init_tracing();
    let dispatcher = start_dispatcher();
    let enabled = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&enabled);
    let cmd = DelegateCommand::with_can_execute(
        dispatcher.context(),
        |_: &()| {},
        move |_: &()| gate.load(Ordering::SeqCst),
    );
    assert!(!cmd.can_execute(&()));

    let (tx, rx) = mpsc::channel::<(ThreadId, SourceId)>();
    let _sub = cmd
        .base()
        .on_can_execute_changed(move |source, _: &CanExecuteChanged| {
            let _ = tx.send((thread::current().id(), *source));
        });

    enabled.store(true, Ordering::SeqCst);
    cmd.raise_can_execute_changed();

    let (thread_id, source) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(thread_id, dispatcher.thread_id());
    assert_eq!(source, cmd.base().source());
    assert!(cmd.can_execute(&()));
}

#[test]
fn property_changes_cross_to_dispatcher() {
    init_tracing();
    let dispatcher = start_dispatcher();
    let notifier = PropertyNotifier::new(dispatcher.context());

    let (tx, rx) = mpsc::channel::<String>();
    let _sub = notifier.subscribe_owned(move |_, change| {
        let _ = tx.send(change.property_name.to_string());
    });

    let mut title = String::from("draft");
    assert!(notifier.set_field(&mut title, "final".to_string(), "title"));
    assert!(!notifier.set_field(&mut title, "final".to_string(), "title"));
    notifier.notify_many(&["body", "footer"]);

    let names: Vec<String> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(names, vec!["title", "body", "footer"]);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn single_property_subscription_filters_on_dispatcher() {
    init_tracing();
    let dispatcher = start_dispatcher();
    let notifier = PropertyNotifier::new(dispatcher.context());

    let (tx, rx) = mpsc::channel::<(ThreadId, String)>();
    let sub = notifier.subscribe_property("status", move |_, change| {
        let _ = tx.send((thread::current().id(), change.property_name.to_string()));
    });

    notifier.notify_many(&["progress", "status", "progress"]);
    let (thread_id, name) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(thread_id, dispatcher.thread_id());
    assert_eq!(name, "status");

    // Everything posted so far has run once this marker comes back.
    let (done_tx, done_rx) = mpsc::channel();
    dispatcher.handle().post(Box::new(move || {
        let _ = done_tx.send(());
    }));
    done_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(rx.try_recv().is_err());

    drop(sub);
    notifier.notify_changed("status");
    let (done_tx, done_rx) = mpsc::channel();
    dispatcher.handle().post(Box::new(move || {
        let _ = done_tx.send(());
    }));
    done_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(rx.try_recv().is_err());
}
