use crate::error::{PopError, PushError};
use crate::loom::{Arc, Mutex};
use std::mem;
use std::task::{Context, Poll, Waker};

pub(crate) type PushSlot = Arc<Slot<Result<(), PushError>>>;
pub(crate) type PopSlot<T> = Arc<Slot<Result<T, PopError>>>;

/// A deferred operation parked in the waiter list.
///
/// A parked push owns its value until it is promoted into the buffer or the
/// record is withdrawn; a parked pop receives its value through the slot.
pub(crate) enum Waiter<T> {
    Push { value: T, slot: PushSlot },
    Pop { slot: PopSlot<T> },
}

impl<T> Waiter<T> {
    pub(crate) fn is_push(&self) -> bool {
        matches!(self, Waiter::Push { .. })
    }

    pub(crate) fn is_pop(&self) -> bool {
        matches!(self, Waiter::Pop { .. })
    }
}

/// Completion cell shared between the queue and the future that owns the
/// operation. The queue moves it to `Done` exactly once; the future observes
/// `Done` on a later poll and takes the outcome out.
pub(crate) struct Slot<O> {
    state: Mutex<SlotState<O>>,
}

enum SlotState<O> {
    Pending(Option<Waker>),
    Done(O),
    Taken,
}

impl<O> Slot<O> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending(None)),
        }
    }

    /// Stores the outcome and hands back the waker to invoke.
    ///
    /// Runs with the queue lock held. The caller wakes only after releasing
    /// that lock, so the resumed task never executes on the initiator's call
    /// stack inside the critical section.
    pub(crate) fn complete(&self, outcome: O) -> Option<Waker> {
        let mut state = self.state.lock().unwrap();
        match mem::replace(&mut *state, SlotState::Done(outcome)) {
            SlotState::Pending(waker) => waker,
            _ => unreachable!("waiter completed twice"),
        }
    }

    pub(crate) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<O> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            SlotState::Pending(waker) => {
                match waker {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    _ => *waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
            SlotState::Done(_) => match mem::replace(&mut *state, SlotState::Taken) {
                SlotState::Done(outcome) => Poll::Ready(outcome),
                _ => unreachable!(),
            },
            SlotState::Taken => unreachable!("slot polled after its outcome was taken"),
        }
    }
}
