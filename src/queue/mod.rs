//! A bounded mpmc queue for async tasks.
//!
//! `push` and `pop` run their queue transition eagerly, inside the call, and
//! complete through the returned future. When the buffer is full, pushes park
//! in a waiter list; when it is empty, pops do. The list only ever holds one
//! kind of waiter, because an arriving operation of the opposite kind is
//! matched against the head waiter right away. With a limit of 0 the queue
//! degenerates to a rendezvous point: values move from a push to a pop
//! through a single transient buffer slot.

mod waiter;
pub mod wrapper;

use self::waiter::{PopSlot, PushSlot, Slot, Waiter};
use crate::error::{PopError, PushError, TryPopError, TryPushError};
use crate::loom::{Arc, Mutex};
use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

pub use self::wrapper::{PopStream, PushSink};

pub struct Queue<T> {
    limit: usize,
    state: Mutex<State<T>>,
}

struct State<T> {
    buffer: VecDeque<T>,
    waiters: VecDeque<Waiter<T>>,
    closed: bool,
}

impl<T> Queue<T> {
    /// Creates a queue buffering at most `limit` elements.
    ///
    /// A limit of 0 gives a rendezvous queue: every push waits for a pop and
    /// hands its value over directly.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            state: Mutex::new(State {
                buffer: VecDeque::new(),
                waiters: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Initiates an asynchronous push.
    ///
    /// The queue transition happens inside this call; the returned future
    /// only observes the completion. If the buffer is full, the operation
    /// parks until a pop makes room, the queue is closed, or the operation is
    /// cancelled. Dropping a parked future withdraws the operation together
    /// with its value.
    pub fn push(&self, value: T) -> Push<'_, T> {
        let mut wake = None;
        let state = self.with_state(|state| {
            if state.closed {
                return PushState::Immediate(Err(PushError::Closed));
            }

            if state.buffer.len() < self.limit || state.front_is_pop() {
                state.buffer.push_back(value);
                // A parked pop means the buffer was empty (or the limit is
                // 0), so the element just appended is the one handed over.
                if let Some(slot) = state.take_front_pop() {
                    let value = state.buffer.pop_front().expect("handoff value missing");
                    wake = slot.complete(Ok(value));
                }
                PushState::Immediate(Ok(()))
            } else {
                let slot = Arc::new(Slot::new());
                state.waiters.push_back(Waiter::Push {
                    value,
                    slot: Arc::clone(&slot),
                });
                PushState::Parked(slot)
            }
        });

        if let Some(waker) = wake {
            waker.wake();
        }

        Push { queue: self, state }
    }

    /// Initiates an asynchronous pop.
    ///
    /// A parked push at the head of the waiter list is promoted first, so a
    /// full queue drains in producer-arrival order. If no value is available
    /// the operation parks; on a closed, drained queue it fails immediately.
    pub fn pop(&self) -> Pop<'_, T> {
        let mut wake = None;
        let state = self.with_state(|state| {
            // A parked push means the buffer sits at the limit; promotion
            // overshoots it by one element until the pop below takes the
            // front. Not observable from outside the lock.
            if let Some((value, slot)) = state.take_front_push() {
                state.buffer.push_back(value);
                wake = slot.complete(Ok(()));
            }

            if let Some(value) = state.buffer.pop_front() {
                PopState::Immediate(Ok(value))
            } else if state.closed {
                PopState::Immediate(Err(PopError::Closed))
            } else {
                let slot = Arc::new(Slot::new());
                state.waiters.push_back(Waiter::Pop {
                    slot: Arc::clone(&slot),
                });
                PopState::Parked(slot)
            }
        });

        if let Some(waker) = wake {
            waker.wake();
        }

        Pop { queue: self, state }
    }

    /// Pushes without waiting. On success the value may be handed directly
    /// to a parked pop.
    pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
        let mut wake = None;
        let ret = self.with_state(|state| {
            if state.closed {
                return Err(TryPushError::Closed(value));
            }

            if state.buffer.len() < self.limit || state.front_is_pop() {
                state.buffer.push_back(value);
                if let Some(slot) = state.take_front_pop() {
                    let value = state.buffer.pop_front().expect("handoff value missing");
                    wake = slot.complete(Ok(value));
                }
                Ok(())
            } else {
                Err(TryPushError::Full(value))
            }
        });

        if let Some(waker) = wake {
            waker.wake();
        }

        ret
    }

    /// Pops without waiting, promoting a parked push first if one exists.
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let mut wake = None;
        let ret = self.with_state(|state| {
            if let Some((value, slot)) = state.take_front_push() {
                state.buffer.push_back(value);
                wake = slot.complete(Ok(()));
            }

            if let Some(value) = state.buffer.pop_front() {
                Ok(value)
            } else if state.closed {
                Err(TryPopError::Closed)
            } else {
                Err(TryPopError::Empty)
            }
        });

        if let Some(waker) = wake {
            waker.wake();
        }

        ret
    }

    /// Cancels the longest-parked push, if any, and returns how many
    /// operations were cancelled (0 or 1).
    pub fn cancel_one_push(&self) -> usize {
        let mut wakers = Vec::new();
        let n = self.with_state(|state| state.cancel_pushes(1, &mut wakers));
        wake_all(wakers);
        n
    }

    /// Cancels every parked push in FIFO order and returns the count.
    pub fn cancel_push(&self) -> usize {
        let mut wakers = Vec::new();
        let n = self.with_state(|state| state.cancel_pushes(usize::MAX, &mut wakers));
        wake_all(wakers);
        n
    }

    /// Cancels the longest-parked pop, if any, and returns how many
    /// operations were cancelled (0 or 1).
    pub fn cancel_one_pop(&self) -> usize {
        let mut wakers = Vec::new();
        let n = self.with_state(|state| state.cancel_pops(1, &mut wakers));
        wake_all(wakers);
        n
    }

    /// Cancels every parked pop in FIFO order and returns the count.
    pub fn cancel_pop(&self) -> usize {
        let mut wakers = Vec::new();
        let n = self.with_state(|state| state.cancel_pops(usize::MAX, &mut wakers));
        wake_all(wakers);
        n
    }

    /// Cancels every parked operation, pushes before pops, and returns the
    /// count.
    pub fn cancel(&self) -> usize {
        let mut wakers = Vec::new();
        let n = self.with_state(|state| {
            state.cancel_pushes(usize::MAX, &mut wakers)
                + state.cancel_pops(usize::MAX, &mut wakers)
        });
        wake_all(wakers);
        n
    }

    /// Closes the queue.
    ///
    /// Every parked operation completes with `Closed`. Buffered values stay
    /// poppable until drained; once the buffer is empty, pops fail with
    /// `Closed`, and pushes fail with `Closed` immediately. Returns whether
    /// this call performed the open-to-closed transition.
    pub fn close(&self) -> bool {
        let mut wakers = Vec::new();
        let closed_now = self.with_state(|state| {
            if state.closed {
                return false;
            }
            state.closed = true;

            while let Some(waiter) = state.waiters.pop_front() {
                match waiter {
                    Waiter::Push { value: _, slot } => {
                        if let Some(waker) = slot.complete(Err(PushError::Closed)) {
                            wakers.push(waker);
                        }
                    }
                    Waiter::Pop { slot } => {
                        if let Some(waker) = slot.complete(Err(PopError::Closed)) {
                            wakers.push(waker);
                        }
                    }
                }
            }
            true
        });
        wake_all(wakers);
        closed_now
    }

    /// Drops all buffered values, cancels every parked operation and reopens
    /// the queue. Returns the number of cancelled operations.
    pub fn reset(&self) -> usize {
        let mut wakers = Vec::new();
        let n = self.with_state(|state| {
            state.buffer.clear();
            state.closed = false;
            state.cancel_pushes(usize::MAX, &mut wakers)
                + state.cancel_pops(usize::MAX, &mut wakers)
        });
        wake_all(wakers);
        n
    }

    pub fn len(&self) -> usize {
        self.with_state(|state| state.buffer.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with_state(|state| state.buffer.is_empty())
    }

    pub fn is_full(&self) -> bool {
        self.with_state(|state| state.buffer.len() >= self.limit)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|state| state.closed)
    }

    /// A `Stream` view of the pop side; ends once the queue is closed and
    /// drained.
    pub fn stream(&self) -> PopStream<'_, T> {
        PopStream::new(self)
    }

    /// A `Sink` view of the push side; a full queue shows up as
    /// backpressure.
    pub fn sink(&self) -> PushSink<'_, T> {
        PushSink::new(self)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<T>) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        state.check(self.limit);
        let ret = f(&mut state);
        state.check(self.limit);
        ret
    }

    fn withdraw_push(&self, slot: &PushSlot) {
        self.with_state(|state| {
            let found = state.waiters.iter().position(|waiter| match waiter {
                Waiter::Push { slot: other, .. } => Arc::ptr_eq(other, slot),
                Waiter::Pop { .. } => false,
            });
            if let Some(idx) = found {
                state.waiters.remove(idx);
            }
        });
    }

    fn withdraw_pop(&self, slot: &PopSlot<T>) {
        self.with_state(|state| {
            let found = state.waiters.iter().position(|waiter| match waiter {
                Waiter::Pop { slot: other } => Arc::ptr_eq(other, slot),
                Waiter::Push { .. } => false,
            });
            if let Some(idx) = found {
                state.waiters.remove(idx);
            }
        });
    }
}

impl<T> State<T> {
    // Asserted on entry and exit of every critical section. Pushes park only
    // against a full buffer, pops only against an empty one, the waiter list
    // holds a single kind, and a closed queue has no waiters at all.
    fn check(&self, limit: usize) {
        debug_assert!(self.buffer.len() <= limit);
        debug_assert!(self.buffer.len() == limit || !self.front_is_push());
        debug_assert!(self.buffer.is_empty() || !self.front_is_pop());
        debug_assert!(!self.closed || self.waiters.is_empty());
        debug_assert!(!(self.front_is_push() && self.waiters.iter().any(Waiter::is_pop)));
        debug_assert!(!(self.front_is_pop() && self.waiters.iter().any(Waiter::is_push)));
    }

    fn front_is_push(&self) -> bool {
        matches!(self.waiters.front(), Some(Waiter::Push { .. }))
    }

    fn front_is_pop(&self) -> bool {
        matches!(self.waiters.front(), Some(Waiter::Pop { .. }))
    }

    fn take_front_push(&mut self) -> Option<(T, PushSlot)> {
        if !self.front_is_push() {
            return None;
        }
        match self.waiters.pop_front() {
            Some(Waiter::Push { value, slot }) => Some((value, slot)),
            _ => unreachable!(),
        }
    }

    fn take_front_pop(&mut self) -> Option<PopSlot<T>> {
        if !self.front_is_pop() {
            return None;
        }
        match self.waiters.pop_front() {
            Some(Waiter::Pop { slot }) => Some(slot),
            _ => unreachable!(),
        }
    }

    fn cancel_pushes(&mut self, at_most: usize, wakers: &mut Vec<Waker>) -> usize {
        let mut n = 0;
        while n < at_most {
            match self.take_front_push() {
                Some((_value, slot)) => {
                    if let Some(waker) = slot.complete(Err(PushError::Cancelled)) {
                        wakers.push(waker);
                    }
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn cancel_pops(&mut self, at_most: usize, wakers: &mut Vec<Waker>) -> usize {
        let mut n = 0;
        while n < at_most {
            match self.take_front_pop() {
                Some(slot) => {
                    if let Some(waker) = slot.complete(Err(PopError::Cancelled)) {
                        wakers.push(waker);
                    }
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}

fn wake_all(wakers: Vec<Waker>) {
    for waker in wakers {
        waker.wake();
    }
}

enum PushState {
    Immediate(Result<(), PushError>),
    Parked(PushSlot),
    Done,
}

/// Future returned by [`Queue::push`].
///
/// The operation is already initiated; dropping the future before it
/// resolves withdraws the operation and its value.
#[must_use = "the push completes through this future"]
pub struct Push<'a, T> {
    queue: &'a Queue<T>,
    state: PushState,
}

impl<T> Future for Push<'_, T> {
    type Output = Result<(), PushError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match mem::replace(&mut this.state, PushState::Done) {
            PushState::Immediate(result) => Poll::Ready(result),
            PushState::Parked(slot) => match slot.poll_take(cx) {
                Poll::Ready(result) => Poll::Ready(result),
                Poll::Pending => {
                    this.state = PushState::Parked(slot);
                    Poll::Pending
                }
            },
            PushState::Done => panic!("Push polled after completion"),
        }
    }
}

impl<T> Drop for Push<'_, T> {
    fn drop(&mut self) {
        if let PushState::Parked(slot) = &self.state {
            self.queue.withdraw_push(slot);
        }
    }
}

enum PopState<T> {
    Immediate(Result<T, PopError>),
    Parked(PopSlot<T>),
    Done,
}

/// Future returned by [`Queue::pop`].
///
/// The operation is already initiated; dropping the future before it
/// resolves withdraws the operation.
#[must_use = "the pop completes through this future"]
pub struct Pop<'a, T> {
    queue: &'a Queue<T>,
    state: PopState<T>,
}

impl<T> Unpin for Pop<'_, T> {}

impl<T> Future for Pop<'_, T> {
    type Output = Result<T, PopError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match mem::replace(&mut this.state, PopState::Done) {
            PopState::Immediate(result) => Poll::Ready(result),
            PopState::Parked(slot) => match slot.poll_take(cx) {
                Poll::Ready(result) => Poll::Ready(result),
                Poll::Pending => {
                    this.state = PopState::Parked(slot);
                    Poll::Pending
                }
            },
            PopState::Done => panic!("Pop polled after completion"),
        }
    }
}

impl<T> Drop for Pop<'_, T> {
    fn drop(&mut self) {
        if let PopState::Parked(slot) = &self.state {
            self.queue.withdraw_pop(slot);
        }
    }
}
