use aqueue_rs::Queue;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let q = Arc::new(Queue::new(128));

    let producer = q.clone();
    tokio::spawn(async move {
        for i in 0..10 {
            if producer.push(i).await.is_err() {
                println!("queue closed");
                return;
            }
        }
        producer.close();
    });

    while let Ok(i) = q.pop().await {
        println!("got = {}", i);
    }
}
