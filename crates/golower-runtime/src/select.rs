//! `select` over heterogeneous channel operations.
//!
//! When some case is ready the first ready case in case order fires. With
//! none ready, a default case fires if present. Otherwise the task registers
//! on every channel; the first partner to arrive claims the select and the
//! remaining registrations are retracted, so exactly one case fires.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::Poll;

use crate::chan::{Channel, RecvSlot, SelectState, SendSlot, Waiter};
use crate::task::{TaskContext, TaskId};
use crate::unwind::Panic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selected {
    Case(usize),
    Default,
}

trait Case {
    fn ready(&self) -> bool;
    fn fire(&mut self, woken: &mut Vec<TaskId>) -> Result<(), Panic>;
    fn register(&mut self, waiter: Waiter);
    /// Finish the case after a partner claimed it.
    fn complete(&mut self) -> Result<(), Panic>;
    fn retract(&mut self);
}

/// Where the value of a receive case lands once the case fires.
pub struct Received<T>(Rc<RefCell<Option<(T, bool)>>>);

impl<T> Received<T> {
    pub fn take(&self) -> Option<(T, bool)> {
        self.0.borrow_mut().take()
    }
}

struct RecvCase<T> {
    chan: Channel<T>,
    out: Rc<RefCell<Option<(T, bool)>>>,
    slot: Option<Rc<RecvSlot<T>>>,
}

impl<T: Default> Case for RecvCase<T> {
    fn ready(&self) -> bool {
        self.chan.recv_ready()
    }

    fn fire(&mut self, woken: &mut Vec<TaskId>) -> Result<(), Panic> {
        *self.out.borrow_mut() = self.chan.try_recv(woken);
        Ok(())
    }

    fn register(&mut self, waiter: Waiter) {
        self.slot = Some(self.chan.enqueue_receiver(waiter));
    }

    fn complete(&mut self) -> Result<(), Panic> {
        if let Some(slot) = self.slot.take() {
            *self.out.borrow_mut() = slot.value.borrow_mut().take();
        }
        Ok(())
    }

    fn retract(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.chan.retract_receiver(&slot);
        }
    }
}

struct SendCase<T> {
    chan: Channel<T>,
    value: Option<T>,
    slot: Option<Rc<SendSlot<T>>>,
}

impl<T> Case for SendCase<T> {
    fn ready(&self) -> bool {
        self.chan.send_ready()
    }

    fn fire(&mut self, woken: &mut Vec<TaskId>) -> Result<(), Panic> {
        if self.chan.is_closed() {
            return Err(Panic::send_on_closed());
        }
        if let Some(value) = self.value.take()
            && let Err(value) = self.chan.try_send(value, woken)
        {
            self.value = Some(value);
        }
        Ok(())
    }

    fn register(&mut self, waiter: Waiter) {
        if let Some(value) = self.value.take() {
            self.slot = Some(self.chan.enqueue_sender(waiter, value));
        }
    }

    fn complete(&mut self) -> Result<(), Panic> {
        match self.slot.take() {
            Some(slot) if !slot.done.get() => Err(Panic::send_on_closed()),
            _ => Ok(()),
        }
    }

    fn retract(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.chan.retract_sender(&slot);
        }
    }
}

#[derive(Default)]
pub struct Select {
    cases: Vec<Box<dyn Case>>,
    has_default: bool,
    state: Option<Rc<SelectState>>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recv<T: Default + 'static>(&mut self, chan: &Channel<T>) -> Received<T> {
        let out = Rc::new(RefCell::new(None));
        self.cases.push(Box::new(RecvCase {
            chan: chan.clone(),
            out: Rc::clone(&out),
            slot: None,
        }));
        Received(out)
    }

    pub fn send<T: 'static>(&mut self, chan: &Channel<T>, value: T) {
        self.cases.push(Box::new(SendCase {
            chan: chan.clone(),
            value: Some(value),
            slot: None,
        }));
    }

    pub fn default_case(&mut self) {
        self.has_default = true;
    }

    pub fn poll(&mut self, cx: &mut TaskContext) -> Poll<Result<Selected, Panic>> {
        if let Some(state) = &self.state {
            let Some(index) = state.fired.get() else {
                return Poll::Pending;
            };
            for (i, case) in self.cases.iter_mut().enumerate() {
                if i != index {
                    case.retract();
                }
            }
            self.state = None;
            return Poll::Ready(self.cases[index].complete().map(|()| Selected::Case(index)));
        }

        if let Some(index) = self.cases.iter().position(|c| c.ready()) {
            let fired = self.cases[index].fire(&mut cx.woken);
            return Poll::Ready(fired.map(|()| Selected::Case(index)));
        }
        if self.has_default {
            return Poll::Ready(Ok(Selected::Default));
        }

        // `select {}` registers nowhere and blocks forever.
        let state = Rc::new(SelectState::default());
        for (i, case) in self.cases.iter_mut().enumerate() {
            case.register(Waiter {
                task: cx.current(),
                select: Some((Rc::clone(&state), i)),
            });
        }
        self.state = Some(state);
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::task::Step;
    use crate::testing::{Log, Op, entries, log, script};
    use crate::timer::after;
    use std::time::Duration;

    /// A task running one select over receives on `chans`, then `then`.
    fn selector(
        chans: Vec<Channel<i32>>,
        with_default: bool,
        then: Vec<Op>,
        log: &Log,
    ) -> impl crate::task::Task + 'static {
        let events = log.clone();
        let mut rest = Some(script("selector", then, log));
        let mut select: Option<(Select, Vec<Received<i32>>)> = None;
        let mut done = false;
        move |cx: &mut TaskContext| {
            if !done {
                let (sel, outs) = select.get_or_insert_with(|| {
                    let mut sel = Select::new();
                    let outs = chans.iter().map(|c| sel.recv(c)).collect();
                    if with_default {
                        sel.default_case();
                    }
                    (sel, outs)
                });
                match sel.poll(cx) {
                    Poll::Pending => return Step::Blocked,
                    Poll::Ready(Err(p)) => return Step::Panic(p),
                    Poll::Ready(Ok(Selected::Default)) => {
                        events.borrow_mut().push("selector: default".into());
                    }
                    Poll::Ready(Ok(Selected::Case(i))) => {
                        let (v, ok) = outs[i].take().unwrap_or_default();
                        events.borrow_mut().push(format!("selector: case {i} got {v} {ok}"));
                    }
                }
                done = true;
            }
            match rest.as_mut() {
                Some(task) => crate::task::Task::resume(task, cx),
                None => Step::Done,
            }
        }
    }

    #[test]
    fn test_first_ready_case_fires() {
        let events = log();
        let (a, b) = (Channel::new(1), Channel::new(1));
        let mut sched = Scheduler::new();
        sched.spawn(script(
            "fill",
            vec![Op::Send(a.clone(), 1), Op::Send(b.clone(), 2)],
            &events,
        ));
        sched.spawn(selector(vec![a, b.clone()], false, vec![Op::Recv(b)], &events));
        sched.run().unwrap();
        assert_eq!(
            entries(&events),
            vec![
                "fill: sent 1",
                "fill: sent 2",
                "selector: case 0 got 1 true",
                "selector: recv 2 true",
            ]
        );
    }

    #[test]
    fn test_default_when_nothing_ready() {
        let events = log();
        let mut sched = Scheduler::new();
        sched.spawn(selector(vec![Channel::new(0)], true, vec![], &events));
        sched.run().unwrap();
        assert_eq!(entries(&events), vec!["selector: default"]);
    }

    #[test]
    fn test_blocked_select_fires_exactly_once() {
        let events = log();
        let (a, b) = (Channel::new(0), Channel::new(0));
        let mut sched = Scheduler::new();
        sched.spawn(selector(
            vec![a.clone(), b.clone()],
            false,
            vec![Op::Recv(b.clone())],
            &events,
        ));
        sched.spawn(script("sa", vec![Op::Send(a, 10)], &events));
        sched.spawn(script("sb", vec![Op::Send(b, 20)], &events));
        sched.run().unwrap();
        assert_eq!(
            entries(&events),
            vec![
                "sa: sent 10",
                "selector: case 0 got 10 true",
                "selector: recv 20 true",
                "sb: sent 20",
            ]
        );
    }

    #[test]
    fn test_select_send_case_to_waiting_receiver() {
        let events = log();
        let ch = Channel::new(0);
        let mut sched = Scheduler::new();
        sched.spawn(script("receiver", vec![Op::Recv(ch.clone())], &events));
        let mut select = None;
        sched.spawn(move |cx: &mut TaskContext| {
            let sel = select.get_or_insert_with(|| {
                let mut sel = Select::new();
                sel.send(&ch, 5);
                sel.default_case();
                sel
            });
            match sel.poll(cx) {
                Poll::Ready(Ok(Selected::Case(0))) => Step::Done,
                other => Step::Panic(crate::Panic::value(format!("unexpected {other:?}"))),
            }
        });
        sched.run().unwrap();
        assert_eq!(entries(&events), vec!["receiver: recv 5 true"]);
    }

    #[test]
    fn test_timeout_through_select() {
        let events = log();
        let never: Channel<i32> = Channel::new(0);
        let mut sched = Scheduler::new();
        let inner = events.clone();
        let mut state: Option<(Select, Received<Duration>)> = None;
        sched.spawn(move |cx: &mut TaskContext| {
            if state.is_none() {
                let timeout = after(cx, Duration::from_millis(50));
                let mut sel = Select::new();
                let _ = sel.recv(&never);
                let fired = sel.recv(&timeout);
                state = Some((sel, fired));
            }
            let Some((sel, fired)) = state.as_mut() else {
                return Step::Done;
            };
            match sel.poll(cx) {
                Poll::Pending => Step::Blocked,
                Poll::Ready(Ok(Selected::Case(1))) => {
                    let (at, _) = fired.take().unwrap_or_default();
                    inner.borrow_mut().push(format!("timed out at {}ms", at.as_millis()));
                    Step::Done
                }
                other => Step::Panic(crate::Panic::value(format!("unexpected {other:?}"))),
            }
        });
        sched.run().unwrap();
        assert_eq!(entries(&events), vec!["timed out at 50ms"]);
    }

    #[test]
    fn test_empty_select_blocks_forever() {
        let mut sched = Scheduler::new();
        let mut sel = Select::new();
        sched.spawn(move |cx: &mut TaskContext| match sel.poll(cx) {
            Poll::Pending => Step::Blocked,
            Poll::Ready(_) => Step::Done,
        });
        assert!(matches!(
            sched.run(),
            Err(crate::RunError::Deadlock { blocked: 1 })
        ));
    }
}
