extern crate altfuture;
extern crate env_logger;
extern crate rand;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use altfuture::{AltFuture, ChainError, CompoundAltFuture, CompoundError, Scheduler, State};

fn scheduler() -> Scheduler {
    let _ = env_logger::builder().is_test(true).try_init();
    Scheduler::builder().with_workers(4).build().unwrap()
}

fn stop(scheduler: Scheduler) {
    scheduler.shutdown();
    scheduler.join();
}

#[test]
fn test_from_then_then() {
    let scheduler = scheduler();

    let tail = scheduler.worker()
        .from("a".to_owned())
        .then(|s| s + "b")
        .then(|s| s + "c")
        .fork();

    assert_eq!(tail.wait().unwrap(), "abc");
    assert_eq!(tail.get(), "abc");
    assert!(tail.is_done());
    assert!(!tail.is_cancelled());
    stop(scheduler);
}

#[test]
fn test_state_observers() {
    let scheduler = scheduler();
    let settable = scheduler.worker().settable::<u32>();
    let future = settable.future();

    assert!(!future.is_done());
    assert!(!future.is_forked());
    assert!(future.try_get().is_none());

    future.fork();
    assert!(future.is_forked());
    assert!(!future.is_done());

    settable.set(5);
    assert!(future.is_done());
    assert_eq!(future.try_get(), Some(5));
    match future.outcome() {
        State::Done(5) => {}
        other => panic!("unexpected {:?}", other),
    }
    stop(scheduler);
}

#[test]
fn test_intermediate_nodes_let_go_of_upchain() {
    let scheduler = scheduler();

    let head = scheduler.worker().then(|| 1);
    let middle = head.then(|n| n + 1);
    let tail = middle.then(|n| n * 2);

    assert!(middle.has_upchain());
    assert_eq!(tail.wait().unwrap(), 4);
    assert!(!middle.has_upchain());
    assert!(!tail.has_upchain());
    stop(scheduler);
}

#[test]
fn test_error_recorded_once_and_chain_cancelled() {
    let scheduler = scheduler();
    let record = Arc::new(Mutex::new(Vec::new()));

    let errors = record.clone();
    let unreachable = record.clone();
    let tail = scheduler.worker()
        .try_then(|| Err::<(), _>("x"))
        .on_error(move |err| {
            errors.lock().unwrap().push(err.to_string());
            true
        })
        .then(move |()| unreachable.lock().unwrap().push("unreachable".to_owned()));

    match tail.wait() {
        Err(ChainError::Cancelled(reason)) => {
            assert!(reason.message().contains("x"), "{}", reason);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(*record.lock().unwrap(), vec!["x".to_owned()]);
    stop(scheduler);
}

#[test]
fn test_panicking_action_fails_node() {
    let scheduler = scheduler();

    let failed: AltFuture<u8> = scheduler.worker().then(|| panic!("kaboom"));
    let seen = Arc::new(Mutex::new(None));

    let slot = seen.clone();
    let handled = failed.on_error(move |err| {
        *slot.lock().unwrap() = Some(err.is_panic());
        false
    });

    let err = handled.wait().unwrap_err();
    assert!(err.is_panic());
    assert_eq!(*seen.lock().unwrap(), Some(true));
    stop(scheduler);
}

#[test]
fn test_downstream_never_runs_after_error() {
    let scheduler = scheduler();
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    let failed = scheduler.worker().try_then(|| Err::<u32, _>("nope"));
    let mut tail = failed.then(move |n| {
        counter.fetch_add(1, Ordering::SeqCst);
        n
    });
    for _ in 0..5 {
        tail = tail.then(|n| n + 1);
    }

    assert!(tail.wait().unwrap_err().is_cancellation());
    assert!(tail.is_cancelled());
    match failed.outcome() {
        State::Error(err) => assert_eq!(err.to_string(), "nope"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    stop(scheduler);
}

#[test]
fn test_cancel_user_abort() {
    let scheduler = scheduler();
    let (tx, rx) = mpsc::channel();

    let head = scheduler.worker().then(|| 1);
    let tails: Vec<_> = (0..3)
        .map(|_| {
            let tx = tx.clone();
            head.then(|n| n + 1).then(|n| n * 2).on_cancelled(move |reason| {
                tx.send(reason.message().to_owned()).unwrap();
            })
        })
        .collect();

    assert!(head.cancel("user abort"));
    for _ in 0..4 {
        assert!(!head.cancel("user abort"));
    }

    for tail in tails.iter() {
        match tail.outcome() {
            State::Cancelled(reason) => assert_eq!(reason.message(), "user abort"),
            other => panic!("unexpected {:?}", other),
        }
    }
    let reasons: Vec<String> = rx.try_iter().collect();
    assert_eq!(reasons, vec!["user abort".to_owned(); 3]);
    stop(scheduler);
}

const LONG_CHAIN: u64 = 100_000;

#[test]
fn test_cancel_long_chain() {
    let scheduler = scheduler();

    let head = scheduler.worker().then(|| 0u64);
    let mut tail = head.clone();
    for _ in 0..LONG_CHAIN {
        tail = tail.then(|n| n + 1);
    }

    assert!(head.cancel("stop"));
    match tail.outcome() {
        State::Cancelled(reason) => assert_eq!(reason.message(), "stop"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!tail.has_upchain());

    drop(head);
    drop(tail);
    stop(scheduler);
}

#[test]
fn test_long_chain_runs_to_completion() {
    let scheduler = scheduler();

    let settable = scheduler.worker().settable::<u64>();
    let mut tail = settable.future();
    for _ in 0..LONG_CHAIN {
        tail = tail.then(|n| n + 1);
    }

    // Forks every link on the way up
    tail.fork();
    settable.set(7);
    assert_eq!(tail.wait().unwrap(), 7 + LONG_CHAIN);

    drop(settable);
    drop(tail);
    stop(scheduler);
}

#[test]
fn test_drop_unforked_long_chain() {
    let scheduler = scheduler();

    let mut tail = scheduler.worker().then(|| 0u64);
    for _ in 0..LONG_CHAIN {
        tail = tail.then(|n| n + 1);
    }
    drop(tail);
    stop(scheduler);
}

#[test]
fn test_double_fork_from_many_threads() {
    let scheduler = scheduler();
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let head = scheduler.worker().then(move || counter.fetch_add(1, Ordering::SeqCst));

        let forkers = rng.gen_range(2..8);
        let handles: Vec<_> = (0..forkers)
            .map(|_| {
                let head = head.clone();
                thread::spawn(move || {
                    head.fork();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        head.wait().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
    stop(scheduler);
}

#[test]
fn test_settable_completes_chain() {
    let scheduler = scheduler();

    let settable = scheduler.worker().settable::<Vec<u32>>();
    let sum = settable.future().map(|n| n * 10).then(|v| v.iter().sum::<u32>());

    settable.set(vec![1, 2, 3]);
    assert_eq!(sum.wait().unwrap(), 60);
    stop(scheduler);
}

#[test]
fn test_await_all_with_random_delays() {
    let scheduler = scheduler();
    let mut rng = rand::thread_rng();
    let finished = Arc::new(AtomicUsize::new(0));

    let others: Vec<AltFuture<()>> = (0..10)
        .map(|_| {
            let delay = Duration::from_millis(rng.gen_range(0..20));
            let finished = finished.clone();
            scheduler.worker().then(move || {
                thread::sleep(delay);
                finished.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let joined = scheduler.worker().from("joined").await_all(others.iter());
    assert_eq!(joined.wait().unwrap(), "joined");
    assert_eq!(finished.load(Ordering::SeqCst), 10);
    stop(scheduler);
}

#[test]
fn test_sleep_on_timer() {
    let scheduler = scheduler();

    let start = Instant::now();
    let late = scheduler.serial_worker().from(1).sleep(Duration::from_millis(40)).then(|n| n + 1);

    assert_eq!(late.wait().unwrap(), 2);
    assert!(start.elapsed() >= Duration::from_millis(40));
    stop(scheduler);
}

#[test]
fn test_thread_hops() {
    let scheduler = scheduler();

    let names = scheduler.file()
        .then(|| current())
        .on(scheduler.net_write())
        .then(|file| (file, current()))
        .then_on(scheduler.ui(), |(file, net)| vec![file, net, current()]);

    assert_eq!(names.wait().unwrap(), vec!["file", "net-write", "ui"]);
    stop(scheduler);
}

fn current() -> String {
    altfuture::ThreadType::current().map(|tt| tt.name().to_owned()).unwrap_or_default()
}

#[test]
fn test_compound() {
    let scheduler = scheduler();

    let head = scheduler.worker().then(|| 2);
    let tail = head.then(|n| n * 5);
    let unrelated = scheduler.worker().then(|| 0);

    assert_eq!(CompoundAltFuture::new(&unrelated, &tail).unwrap_err(),
               CompoundError::Unreachable {
                   head: unrelated.id(),
                   tail: tail.id(),
               });
    assert_eq!(CompoundAltFuture::new(&tail, &tail).unwrap_err(),
               CompoundError::HeadHasUpchain { head: tail.id() });

    let compound = CompoundAltFuture::new(&head, &tail).unwrap();
    let after = compound.then(|n| n + 1);
    compound.fork();

    assert_eq!(after.wait().unwrap(), 11);
    assert_eq!(compound.get(), 10);
    stop(scheduler);
}

#[test]
fn test_compound_cancel_reaches_tail() {
    let scheduler = scheduler();

    let head = scheduler.worker().settable::<u8>();
    let tail = head.future().then(|n| n + 1).then(|n| n + 1);
    let compound = CompoundAltFuture::new(&head.future(), &tail).unwrap();

    assert!(compound.cancel("abandoned"));
    assert!(tail.is_cancelled());

    // Setting a cancelled head is dropped quietly
    head.set(1);
    assert!(compound.wait().unwrap_err().is_cancellation());
    stop(scheduler);
}

#[test]
fn test_fork_on_shut_down_thread_type_cancels() {
    let scheduler = scheduler();
    scheduler.file().shutdown();

    let node = scheduler.file().then(|| 1).fork();
    match node.outcome() {
        State::Cancelled(reason) => assert!(reason.message().contains("file"), "{}", reason),
        other => panic!("unexpected {:?}", other),
    }
    stop(scheduler);
}
