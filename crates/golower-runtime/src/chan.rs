//! Channels with Go semantics: unbuffered rendezvous, bounded buffers,
//! close, and FIFO queues of blocked senders and receivers.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Poll;

use crate::task::{TaskContext, TaskId};
use crate::unwind::Panic;

/// Shared by all registrations of one blocked `select`.
#[derive(Debug, Default)]
pub(crate) struct SelectState {
    pub(crate) fired: Cell<Option<usize>>,
}

/// Who is blocked, and for select cases which case of which select.
#[derive(Debug, Clone)]
pub(crate) struct Waiter {
    pub(crate) task: TaskId,
    pub(crate) select: Option<(Rc<SelectState>, usize)>,
}

impl Waiter {
    pub(crate) fn task(task: TaskId) -> Self {
        Self { task, select: None }
    }

    /// A case of a select that already fired must not be completed.
    fn is_live(&self) -> bool {
        self.select
            .as_ref()
            .is_none_or(|(state, _)| state.fired.get().is_none())
    }

    /// Take the waiter for completion. Fails for stale select cases.
    fn claim(&self) -> bool {
        match &self.select {
            None => true,
            Some((state, index)) => {
                if state.fired.get().is_some() {
                    return false;
                }
                state.fired.set(Some(*index));
                true
            }
        }
    }
}

pub(crate) struct RecvSlot<T> {
    waiter: Waiter,
    pub(crate) value: RefCell<Option<(T, bool)>>,
}

pub(crate) struct SendSlot<T> {
    waiter: Waiter,
    value: RefCell<Option<T>>,
    pub(crate) done: Cell<bool>,
}

struct ChanState<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    closed: bool,
    recv_queue: VecDeque<Rc<RecvSlot<T>>>,
    send_queue: VecDeque<Rc<SendSlot<T>>>,
}

/// A channel handle. Clones refer to the same channel.
pub struct Channel<T> {
    state: Rc<RefCell<ChanState<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> Channel<T> {
    /// `make(chan T, capacity)`. Capacity 0 is unbuffered.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(ChanState {
                buffer: VecDeque::new(),
                capacity,
                closed: false,
                recv_queue: VecDeque::new(),
                send_queue: VecDeque::new(),
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.state.borrow().capacity
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Start sending `value`. Poll the returned operation until it is ready.
    pub fn send(&self, value: T) -> SendOp<T> {
        SendOp {
            chan: self.clone(),
            value: Some(value),
            slot: None,
        }
    }

    pub(crate) fn send_ready(&self) -> bool {
        let s = self.state.borrow();
        s.closed || s.buffer.len() < s.capacity || s.recv_queue.iter().any(|r| r.waiter.is_live())
    }

    /// Complete a send without blocking, or hand the value back.
    pub(crate) fn try_send(&self, value: T, woken: &mut Vec<TaskId>) -> Result<(), T> {
        let mut s = self.state.borrow_mut();
        while let Some(receiver) = s.recv_queue.pop_front() {
            if receiver.waiter.claim() {
                *receiver.value.borrow_mut() = Some((value, true));
                woken.push(receiver.waiter.task);
                return Ok(());
            }
        }
        if s.buffer.len() < s.capacity {
            s.buffer.push_back(value);
            return Ok(());
        }
        Err(value)
    }

    pub(crate) fn enqueue_sender(&self, waiter: Waiter, value: T) -> Rc<SendSlot<T>> {
        let slot = Rc::new(SendSlot {
            waiter,
            value: RefCell::new(Some(value)),
            done: Cell::new(false),
        });
        self.state.borrow_mut().send_queue.push_back(Rc::clone(&slot));
        slot
    }

    pub(crate) fn enqueue_receiver(&self, waiter: Waiter) -> Rc<RecvSlot<T>> {
        let slot = Rc::new(RecvSlot {
            waiter,
            value: RefCell::new(None),
        });
        self.state.borrow_mut().recv_queue.push_back(Rc::clone(&slot));
        slot
    }

    pub(crate) fn retract_sender(&self, slot: &Rc<SendSlot<T>>) {
        self.state
            .borrow_mut()
            .send_queue
            .retain(|s| !Rc::ptr_eq(s, slot));
    }

    pub(crate) fn retract_receiver(&self, slot: &Rc<RecvSlot<T>>) {
        self.state
            .borrow_mut()
            .recv_queue
            .retain(|s| !Rc::ptr_eq(s, slot));
    }
}

impl<T: Default> Channel<T> {
    /// Start receiving. The operation yields `(value, true)`, or the zero
    /// value and `false` once the channel is closed and drained.
    pub fn recv(&self) -> RecvOp<T> {
        RecvOp {
            chan: self.clone(),
            slot: None,
        }
    }

    /// Close the channel. Blocked receivers get the zero value; blocked
    /// senders wake up and panic.
    pub fn close(&self, cx: &mut TaskContext) -> Result<(), Panic> {
        self.close_with(&mut cx.woken)
    }

    pub(crate) fn close_with(&self, woken: &mut Vec<TaskId>) -> Result<(), Panic> {
        let mut s = self.state.borrow_mut();
        if s.closed {
            return Err(Panic::runtime("close of closed channel"));
        }
        s.closed = true;
        for sender in s.send_queue.drain(..) {
            if sender.waiter.claim() {
                woken.push(sender.waiter.task);
            }
        }
        for receiver in s.recv_queue.drain(..) {
            if receiver.waiter.claim() {
                *receiver.value.borrow_mut() = Some((T::default(), false));
                woken.push(receiver.waiter.task);
            }
        }
        Ok(())
    }

    pub(crate) fn recv_ready(&self) -> bool {
        let s = self.state.borrow();
        s.closed || !s.buffer.is_empty() || s.send_queue.iter().any(|w| w.waiter.is_live())
    }

    /// Complete a receive without blocking, if possible.
    pub(crate) fn try_recv(&self, woken: &mut Vec<TaskId>) -> Option<(T, bool)> {
        let mut s = self.state.borrow_mut();
        // A blocked sender's value goes to the back of the buffer so that
        // buffered values are still received first.
        while let Some(sender) = s.send_queue.pop_front() {
            if sender.waiter.claim() {
                if let Some(value) = sender.value.borrow_mut().take() {
                    s.buffer.push_back(value);
                }
                sender.done.set(true);
                woken.push(sender.waiter.task);
                break;
            }
        }
        if let Some(value) = s.buffer.pop_front() {
            return Some((value, true));
        }
        if s.closed {
            return Some((T::default(), false));
        }
        None
    }
}

/// An in-progress send.
pub struct SendOp<T> {
    chan: Channel<T>,
    value: Option<T>,
    slot: Option<Rc<SendSlot<T>>>,
}

impl<T> SendOp<T> {
    pub fn poll(&mut self, cx: &mut TaskContext) -> Poll<Result<(), Panic>> {
        if let Some(slot) = &self.slot {
            if slot.done.get() {
                return Poll::Ready(Ok(()));
            }
            if self.chan.is_closed() {
                return Poll::Ready(Err(Panic::send_on_closed()));
            }
            return Poll::Pending;
        }
        if self.chan.is_closed() {
            return Poll::Ready(Err(Panic::send_on_closed()));
        }
        let Some(value) = self.value.take() else {
            return Poll::Ready(Ok(()));
        };
        match self.chan.try_send(value, &mut cx.woken) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(value) => {
                self.slot = Some(self.chan.enqueue_sender(Waiter::task(cx.current()), value));
                Poll::Pending
            }
        }
    }
}

/// An in-progress receive.
pub struct RecvOp<T> {
    chan: Channel<T>,
    slot: Option<Rc<RecvSlot<T>>>,
}

impl<T: Default> RecvOp<T> {
    pub fn poll(&mut self, cx: &mut TaskContext) -> Poll<(T, bool)> {
        if let Some(slot) = &self.slot {
            return match slot.value.borrow_mut().take() {
                Some(received) => Poll::Ready(received),
                None => Poll::Pending,
            };
        }
        if let Some(received) = self.chan.try_recv(&mut cx.woken) {
            return Poll::Ready(received);
        }
        self.slot = Some(self.chan.enqueue_receiver(Waiter::task(cx.current())));
        Poll::Pending
    }
}
