// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

extern crate altfuture;
extern crate num_cpus;
extern crate time;

use altfuture::{AltFuture, Scheduler};

const NS_PER_MS: usize = 1_000_000;

#[derive(Clone, Copy)]
struct Result {
    duration: usize,
    nodes: usize,
}

#[inline]
fn rdiv(a: usize, b: usize) -> usize {
    (a + (b / 2)) / b
}

/// Fork `chains` independent chains of `length` links each and wait for
/// all of them, `rounds` times.
fn run_test(workers: usize, rounds: usize) -> Vec<Result> {
    const CHAINS: usize = 1_000;
    const LENGTH: usize = 16;

    let scheduler = Scheduler::builder()
        .with_workers(workers)
        .thread_name_prefix("bench")
        .build()
        .unwrap();
    let worker = scheduler.worker();

    let mut results = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let beg = time::precise_time_ns();

        let tails: Vec<AltFuture<usize>> = (0..CHAINS)
            .map(|i| {
                let mut node = worker.then(move || i);
                for _ in 0..LENGTH {
                    node = node.then(|n| n + 1);
                }
                node.fork()
            })
            .collect();

        let joined = worker.from(()).await_all(tails.iter()).fork();
        joined.wait().unwrap();

        let end = time::precise_time_ns();
        results.push(Result {
            duration: (end - beg) as usize,
            nodes: CHAINS * (LENGTH + 1),
        });
    }

    scheduler.shutdown();
    scheduler.join();
    results
}

// Run this benchmark with
//   cargo bench --bench chain -- --csv
// to get a parsable output.
// The first column will contain the worker count for that data plot and
// the second column will contain the ns/node.
fn main() {
    let csv = std::env::args().any(|arg| arg == "--csv");

    for i in 1..(num_cpus::get() + 1) {
        let results = run_test(i, 10);

        if csv {
            for r in results.iter() {
                println!("{};{}", i, rdiv(r.duration, r.nodes));
            }
        } else {
            let perf_sum = results.iter().fold(0, |acc, r| acc + rdiv(r.duration, r.nodes));
            let perf_avg = rdiv(perf_sum, results.len());
            let deviation_sum = results.iter().fold(0, |acc, r| {
                let avg = perf_avg as isize;
                let perf = rdiv(r.duration, r.nodes) as isize;
                let diff = avg - perf;
                acc + (diff * diff) as usize
            });
            let variance = rdiv(deviation_sum, results.len());

            println!("\n==== {} Workers ====\n", i);

            for (round, r) in results.iter().enumerate() {
                println!("Round {}: {} nodes in {} ms => {} ns/node",
                         round,
                         r.nodes,
                         rdiv(r.duration, NS_PER_MS),
                         rdiv(r.duration, r.nodes));
            }

            println!("Avg: {} ns/node, Var: {}", perf_avg, variance);
        }
    }
}
