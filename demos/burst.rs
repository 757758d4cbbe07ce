extern crate clap;
#[macro_use] extern crate log;
extern crate env_logger;
extern crate rand;

extern crate altfuture;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Arg, App};
use rand::Rng;

use altfuture::{ReactiveValue, Scheduler};

fn main() {
    env_logger::init();

    let matches = App::new("burst")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Fires a burst of updates at a reactive value and reports how many got delivered")
            .arg(Arg::with_name("UPDATES").short("n").long("updates").takes_value(true)
                    .help("Number of updates in the burst"))
            .arg(Arg::with_name("THREADS").short("t").long("threads").takes_value(true)
                    .help("Number of worker threads"))
            .get_matches();

    let updates: u64 = matches.value_of("UPDATES").unwrap_or("100000").parse().unwrap();
    let threads: usize = matches.value_of("THREADS").unwrap_or("4").parse().unwrap();

    let scheduler = Scheduler::builder().with_workers(threads).build().unwrap();

    let value = ReactiveValue::new(scheduler.serial_worker(), "burst", Some(0u64));
    let delivered = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);

    let counter = delivered.clone();
    let _guard = value.map(|v| v * 2)
        .subscribe(move |v| {
            counter.fetch_add(1, Ordering::Relaxed);
            let _ = tx.lock().unwrap().send(v);
        })
        .guard();

    let mut rng = rand::thread_rng();
    let start = Instant::now();
    let mut last = 0;
    for _ in 0..updates {
        last = rng.gen_range(1..u64::max_value() / 2);
        value.set(last);
    }

    // Every delivery is eventually followed by one carrying the final value
    loop {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(v) if v == last * 2 => break,
            Ok(_) => {}
            Err(err) => {
                error!("Final value never arrived: {}", err);
                return;
            }
        }
    }

    info!("{} updates, {} deliveries in {:?}",
          updates,
          delivered.load(Ordering::Relaxed),
          start.elapsed());

    let summary = scheduler.worker()
        .from(delivered.load(Ordering::Relaxed))
        .then(move |n| format!("coalesced {} of {} updates", updates as usize - n.min(updates as usize), updates))
        .wait()
        .unwrap();
    println!("{}", summary);

    scheduler.shutdown();
    scheduler.join();
}
