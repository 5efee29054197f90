use aqueue_rs::Queue;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{hint, thread};
use tokio::runtime::Builder;

fn block_on<F: Future>(f: F) -> F::Output {
    let mut builder = Builder::new_current_thread();
    let rt = builder.build().unwrap();

    rt.block_on(f)
}

fn sum_test(amt: u64, producers: u64, limit: usize) {
    let q = Arc::new(Queue::new(limit));

    let mut senders = Vec::new();
    for _ in 0..producers {
        let q = q.clone();
        senders.push(thread::spawn(move || {
            block_on(async move {
                for i in 1..=amt {
                    q.push(i).await.unwrap();
                }
            })
        }));
    }

    let expect = producers * amt * (amt + 1) / 2;
    let total = producers * amt;

    let rx_complete = Arc::new(AtomicBool::new(false));
    let rx_complete1 = rx_complete.clone();
    let q1 = q.clone();
    let receiver = thread::spawn(move || {
        let sum = block_on(async move {
            let mut sum = 0;
            for _ in 0..total {
                sum += q1.pop().await.unwrap();
            }
            sum
        });
        assert_eq!(sum, expect);
        rx_complete1.store(true, Ordering::Release);
    });

    let now = Instant::now();
    while !rx_complete.load(Ordering::Acquire) {
        if now.elapsed() > Duration::from_secs(30) {
            panic!("exec timeout")
        }

        hint::spin_loop();
    }

    receiver.join().unwrap();
    for t in senders {
        t.join().unwrap();
    }

    assert!(q.is_empty());
    assert_eq!(q.cancel(), 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn single_producer_single_consumer() {
    // the consumer's running sum over 1..=10000 must be 50005000
    sum_test(10_000, 1, 10);
}

#[test]
#[cfg_attr(miri, ignore)]
fn many_producers_single_consumer() {
    // ten producers each push 1..=1000, summing to 5005000
    sum_test(1_000, 10, 15);
}

#[test]
#[cfg_attr(miri, ignore)]
fn ping_pong_limit_one() {
    sum_test(10_000, 1, 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn rendezvous_burn_in() {
    sum_test(1_000, 1, 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn single_producer_many_consumers() {
    let q = Arc::new(Queue::new(15));
    let sum = Arc::new(AtomicU64::new(0));

    let mut receivers = Vec::new();
    for _ in 0..10 {
        let q = q.clone();
        let sum = sum.clone();
        receivers.push(thread::spawn(move || {
            block_on(async move {
                for _ in 0..1_000 {
                    let v = q.pop().await.unwrap();
                    sum.fetch_add(v, Ordering::Relaxed);
                }
            })
        }));
    }

    let q1 = q.clone();
    let producer = thread::spawn(move || {
        block_on(async move {
            for i in 1..=10_000u64 {
                q1.push(i).await.unwrap();
            }
        })
    });

    producer.join().unwrap();
    for t in receivers {
        t.join().unwrap();
    }

    assert_eq!(sum.load(Ordering::Relaxed), 50_005_000);
    assert!(q.is_empty());
    assert_eq!(q.cancel(), 0);
}
