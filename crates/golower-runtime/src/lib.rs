//! Reference model of the execution model golower's generated code runs on.
//!
//! Goroutines are cooperative tasks resumed by a single-threaded
//! [`Scheduler`]; a task gives up control only at a blocking operation. The
//! JavaScript prelude emitted by the compiler implements the same semantics
//! with generator functions. This crate pins those semantics down in a form
//! that can be tested directly, and hosts the numeric routines the compiler
//! folds at compile time.

mod chan;
pub mod numeric;
mod scheduler;
mod select;
mod task;
mod timer;
mod unwind;

pub use chan::{Channel, RecvOp, SendOp};
pub use scheduler::{RunError, Scheduler};
pub use select::{Received, Select, Selected};
pub use task::{Step, Task, TaskContext, TaskId};
pub use timer::{SleepOp, after, sleep};
pub use unwind::{DeferStack, Panic, Unwind};

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::task::Poll;
    use std::time::Duration;

    use super::*;

    pub type Log = Rc<RefCell<Vec<String>>>;

    pub fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    pub enum Op {
        Send(Channel<i32>, i32),
        Recv(Channel<i32>),
        Close(Channel<i32>),
        Sleep(Duration),
        Yield,
        Note(&'static str),
    }

    enum InFlight {
        Send(SendOp<i32>, i32),
        Recv(RecvOp<i32>),
        Sleep(SleepOp),
    }

    /// A task that runs `ops` in order and records what happened.
    pub fn script(name: &'static str, ops: Vec<Op>, log: &Log) -> impl Task + 'static {
        let log = log.clone();
        let mut ops: VecDeque<Op> = ops.into();
        let mut in_flight: Option<InFlight> = None;
        move |cx: &mut TaskContext| loop {
            if in_flight.is_none() {
                let Some(op) = ops.pop_front() else {
                    return Step::Done;
                };
                match op {
                    Op::Send(ch, v) => in_flight = Some(InFlight::Send(ch.send(v), v)),
                    Op::Recv(ch) => in_flight = Some(InFlight::Recv(ch.recv())),
                    Op::Sleep(d) => in_flight = Some(InFlight::Sleep(sleep(d))),
                    Op::Close(ch) => {
                        if let Err(p) = ch.close(cx) {
                            return Step::Panic(p);
                        }
                        log.borrow_mut().push(format!("{name}: closed"));
                        continue;
                    }
                    Op::Yield => return Step::Yield,
                    Op::Note(text) => {
                        log.borrow_mut().push(format!("{name}: {text}"));
                        continue;
                    }
                }
            }
            let entry = match in_flight.as_mut() {
                Some(InFlight::Send(op, v)) => match op.poll(cx) {
                    Poll::Pending => return Step::Blocked,
                    Poll::Ready(Err(p)) => return Step::Panic(p),
                    Poll::Ready(Ok(())) => format!("{name}: sent {v}"),
                },
                Some(InFlight::Recv(op)) => match op.poll(cx) {
                    Poll::Pending => return Step::Blocked,
                    Poll::Ready((v, ok)) => format!("{name}: recv {v} {ok}"),
                },
                Some(InFlight::Sleep(op)) => match op.poll(cx) {
                    Poll::Pending => return Step::Blocked,
                    Poll::Ready(()) => format!("{name}: woke at {}ms", cx.now().as_millis()),
                },
                None => continue,
            };
            log.borrow_mut().push(entry);
            in_flight = None;
        }
    }

    pub fn entries(log: &Log) -> Vec<String> {
        log.borrow().clone()
    }
}
