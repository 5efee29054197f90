#![cfg(loom)]

use aqueue_rs::Queue;
use loom::future::block_on;
use loom::sync::Arc;
use loom::thread;

#[test]
fn push_pop_handoff() {
    loom::model(|| {
        let q = Arc::new(Queue::new(1));

        let q1 = q.clone();
        thread::spawn(move || {
            block_on(async move {
                q1.push(0).await.unwrap();
                q1.push(1).await.unwrap();
            })
        });

        block_on(async move {
            assert_eq!(q.pop().await.unwrap(), 0);
            assert_eq!(q.pop().await.unwrap(), 1);
        })
    })
}

#[test]
fn closing_with_buffered_value() {
    loom::model(|| {
        let q = Arc::new(Queue::new(1));

        let q1 = q.clone();
        let t = thread::spawn(move || {
            q1.try_push(7).unwrap();
            q1.close();
        });

        assert_eq!(block_on(q.pop()), Ok(7));
        t.join().unwrap();
        assert!(block_on(q.pop()).is_err());
    });
}
