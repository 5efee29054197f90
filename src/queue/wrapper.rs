use crate::error::PushError;
use crate::queue::{Pop, Push, Queue};
use futures_core::Stream;
use futures_sink::Sink;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Stream of popped values; ends once the queue is closed and drained (or
/// the in-flight pop is cancelled).
pub struct PopStream<'a, T> {
    queue: &'a Queue<T>,
    pending: Option<Pop<'a, T>>,
}

impl<'a, T> PopStream<'a, T> {
    pub fn new(queue: &'a Queue<T>) -> Self {
        Self {
            queue,
            pending: None,
        }
    }
}

impl<T> Stream for PopStream<'_, T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let queue = this.queue;
        let pending = this.pending.get_or_insert_with(|| queue.pop());
        match Pin::new(pending).poll(cx) {
            Poll::Ready(result) => {
                this.pending = None;
                Poll::Ready(result.ok())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sink over the push side.
///
/// `start_send` initiates the push; the following `poll_ready`/`poll_flush`
/// drives it to completion, so a full queue shows up as backpressure.
pub struct PushSink<'a, T> {
    queue: &'a Queue<T>,
    in_flight: Option<Push<'a, T>>,
}

impl<'a, T> PushSink<'a, T> {
    pub fn new(queue: &'a Queue<T>) -> Self {
        Self {
            queue,
            in_flight: None,
        }
    }

    fn poll_in_flight(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), PushError>> {
        match &mut self.in_flight {
            Some(push) => match Pin::new(push).poll(cx) {
                Poll::Ready(result) => {
                    self.in_flight = None;
                    Poll::Ready(result)
                }
                Poll::Pending => Poll::Pending,
            },
            None => Poll::Ready(Ok(())),
        }
    }
}

impl<T> Sink<T> for PushSink<'_, T> {
    type Error = PushError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.get_mut().poll_in_flight(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        let this = self.get_mut();
        assert!(
            this.in_flight.is_none(),
            "start_send before poll_ready returned Ready"
        );
        this.in_flight = Some(this.queue.push(item));
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.get_mut().poll_in_flight(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.get_mut().poll_in_flight(cx)
    }
}
