use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use thiserror::Error;

use crate::task::{Step, Task, TaskContext, TaskId, TimerAction};
use crate::unwind::Panic;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("fatal error: all goroutines are asleep - deadlock!")]
    Deadlock { blocked: usize },

    #[error("goroutine {task}: {panic}")]
    Panicked { task: TaskId, panic: Panic },
}

struct Slot {
    task: Box<dyn Task>,
    parked: bool,
}

/// Single-threaded cooperative scheduler with a FIFO run queue and a
/// virtual clock that only advances when nothing is runnable.
#[derive(Default)]
pub struct Scheduler {
    /// Unfinished tasks. Ids are never reused, so a stale wake from a
    /// leftover timer or waiter cannot reach a later task.
    tasks: HashMap<TaskId, Slot>,
    next_id: TaskId,
    run_queue: VecDeque<TaskId>,
    timers: BTreeMap<(Duration, u64), TimerAction>,
    timer_seq: u64,
    now: Duration,
    live: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, task: impl Task + 'static) -> TaskId {
        self.spawn_boxed(Box::new(task))
    }

    fn spawn_boxed(&mut self, task: Box<dyn Task>) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(
            id,
            Slot {
                task,
                parked: false,
            },
        );
        self.run_queue.push_back(id);
        self.live += 1;
        tracing::trace!(task = id, "spawned");
        id
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Tasks spawned and not yet finished.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Make a parked task runnable. Waking a runnable or finished task is a
    /// no-op, so external events may wake conservatively.
    pub fn wake(&mut self, id: TaskId) {
        if let Some(slot) = self.tasks.get_mut(&id)
            && slot.parked
        {
            slot.parked = false;
            self.run_queue.push_back(id);
        }
    }

    /// Run until every task has finished.
    pub fn run(&mut self) -> Result<(), RunError> {
        loop {
            while let Some(id) = self.run_queue.pop_front() {
                self.step(id)?;
            }
            if self.live == 0 {
                return Ok(());
            }
            if !self.fire_timers() {
                tracing::debug!(blocked = self.live, "deadlock");
                return Err(RunError::Deadlock { blocked: self.live });
            }
        }
    }

    fn step(&mut self, id: TaskId) -> Result<(), RunError> {
        let Some(slot) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        let mut cx = TaskContext::new(id, self.now);
        match slot.task.resume(&mut cx) {
            Step::Yield => self.run_queue.push_back(id),
            Step::Blocked => slot.parked = true,
            Step::Done => {
                self.tasks.remove(&id);
                self.live -= 1;
                tracing::trace!(task = id, "finished");
            }
            Step::Panic(panic) => return Err(RunError::Panicked { task: id, panic }),
        }
        // Wakes are applied after the step so a task that completed its own
        // wait during the step is not lost.
        for task in cx.spawned {
            self.spawn_boxed(task);
        }
        for (deadline, action) in cx.timers {
            self.timers.insert((deadline, self.timer_seq), action);
            self.timer_seq += 1;
        }
        for task in cx.woken {
            self.wake(task);
        }
        Ok(())
    }

    /// Advance the clock to the earliest timer and fire everything due.
    fn fire_timers(&mut self) -> bool {
        let Some(((deadline, _), first)) = self.timers.pop_first() else {
            return false;
        };
        self.now = self.now.max(deadline);
        let mut woken = Vec::new();
        let mut due = vec![first];
        while let Some(entry) = self.timers.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            due.push(entry.remove());
        }
        for action in due {
            match action {
                TimerAction::Wake(task) => woken.push(task),
                TimerAction::Fire(fire) => fire(self.now, &mut woken),
            }
        }
        for task in woken {
            self.wake(task);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::Channel;
    use crate::testing::{Op, entries, log, script};

    #[test]
    fn test_unbuffered_send_waits_for_receiver() {
        let events = log();
        let ch = Channel::new(0);
        let mut sched = Scheduler::new();
        sched.spawn(script(
            "producer",
            vec![Op::Send(ch.clone(), 1), Op::Send(ch.clone(), 2), Op::Note("done")],
            &events,
        ));
        sched.spawn(script("consumer", vec![Op::Recv(ch.clone()), Op::Recv(ch)], &events));
        sched.run().unwrap();
        assert_eq!(
            entries(&events),
            vec![
                "consumer: recv 1 true",
                "producer: sent 1",
                "producer: sent 2",
                "producer: done",
                "consumer: recv 2 true",
            ]
        );
    }

    #[test]
    fn test_buffered_send_blocks_only_when_full() {
        let events = log();
        let ch = Channel::new(2);
        let mut sched = Scheduler::new();
        sched.spawn(script(
            "producer",
            vec![
                Op::Send(ch.clone(), 1),
                Op::Send(ch.clone(), 2),
                Op::Send(ch.clone(), 3),
                Op::Note("done"),
            ],
            &events,
        ));
        sched.spawn(script(
            "consumer",
            vec![Op::Recv(ch.clone()), Op::Recv(ch.clone()), Op::Recv(ch)],
            &events,
        ));
        sched.run().unwrap();
        assert_eq!(
            entries(&events),
            vec![
                "producer: sent 1",
                "producer: sent 2",
                "consumer: recv 1 true",
                "consumer: recv 2 true",
                "consumer: recv 3 true",
                "producer: sent 3",
                "producer: done",
            ]
        );
    }

    #[test]
    fn test_receive_from_closed_channel_drains_then_yields_zero() {
        let events = log();
        let ch = Channel::new(1);
        let mut sched = Scheduler::new();
        sched.spawn(script(
            "producer",
            vec![Op::Send(ch.clone(), 7), Op::Close(ch.clone())],
            &events,
        ));
        sched.spawn(script(
            "consumer",
            vec![Op::Recv(ch.clone()), Op::Recv(ch.clone()), Op::Recv(ch)],
            &events,
        ));
        sched.run().unwrap();
        assert_eq!(
            entries(&events),
            vec![
                "producer: sent 7",
                "producer: closed",
                "consumer: recv 7 true",
                "consumer: recv 0 false",
                "consumer: recv 0 false",
            ]
        );
    }

    #[test]
    fn test_close_wakes_blocked_receiver() {
        let events = log();
        let ch = Channel::new(0);
        let mut sched = Scheduler::new();
        sched.spawn(script("waiter", vec![Op::Recv(ch.clone())], &events));
        sched.spawn(script("closer", vec![Op::Close(ch)], &events));
        sched.run().unwrap();
        assert_eq!(entries(&events), vec!["closer: closed", "waiter: recv 0 false"]);
    }

    #[test]
    fn test_send_on_closed_channel_panics() {
        let events = log();
        let ch = Channel::new(1);
        let mut sched = Scheduler::new();
        sched.spawn(script("g", vec![Op::Close(ch.clone()), Op::Send(ch, 1)], &events));
        assert_eq!(
            sched.run(),
            Err(RunError::Panicked {
                task: 0,
                panic: Panic::runtime("send on closed channel"),
            })
        );
    }

    #[test]
    fn test_close_wakes_blocked_sender_which_panics() {
        let events = log();
        let ch = Channel::new(0);
        let mut sched = Scheduler::new();
        sched.spawn(script("sender", vec![Op::Send(ch.clone(), 1)], &events));
        sched.spawn(script("closer", vec![Op::Close(ch)], &events));
        let err = sched.run().unwrap_err();
        assert_eq!(
            err,
            RunError::Panicked {
                task: 0,
                panic: Panic::runtime("send on closed channel"),
            }
        );
        assert_eq!(entries(&events), vec!["closer: closed"]);
    }

    #[test]
    fn test_double_close_panics() {
        let events = log();
        let ch = Channel::new(0);
        let mut sched = Scheduler::new();
        sched.spawn(script("g", vec![Op::Close(ch.clone()), Op::Close(ch)], &events));
        let err = sched.run().unwrap_err();
        assert_eq!(err.to_string(), "goroutine 0: panic: runtime error: close of closed channel");
    }

    #[test]
    fn test_deadlock_is_reported() {
        let events = log();
        let ch = Channel::new(0);
        let mut sched = Scheduler::new();
        sched.spawn(script("main", vec![Op::Recv(ch)], &events));
        let err = sched.run().unwrap_err();
        assert_eq!(err, RunError::Deadlock { blocked: 1 });
        assert_eq!(err.to_string(), "fatal error: all goroutines are asleep - deadlock!");
    }

    #[test]
    fn test_sleep_advances_virtual_clock() {
        let events = log();
        let mut sched = Scheduler::new();
        sched.spawn(script("slow", vec![Op::Sleep(Duration::from_millis(10))], &events));
        sched.spawn(script("fast", vec![Op::Sleep(Duration::from_millis(5))], &events));
        sched.run().unwrap();
        assert_eq!(entries(&events), vec!["fast: woke at 5ms", "slow: woke at 10ms"]);
        assert_eq!(sched.now(), Duration::from_millis(10));
    }

    #[test]
    fn test_yield_round_robin() {
        let events = log();
        let mut sched = Scheduler::new();
        sched.spawn(script("a", vec![Op::Note("1"), Op::Yield, Op::Note("2")], &events));
        sched.spawn(script("b", vec![Op::Note("1"), Op::Yield, Op::Note("2")], &events));
        sched.run().unwrap();
        assert_eq!(entries(&events), vec!["a: 1", "b: 1", "a: 2", "b: 2"]);
    }

    #[test]
    fn test_finished_tasks_release_their_slots() {
        let events = log();
        let mut sched = Scheduler::new();
        let first = sched.spawn(script("a", vec![Op::Note("ran")], &events));
        sched.run().unwrap();
        assert!(sched.tasks.is_empty());

        // A late wake for the finished task must not reach its successor.
        let ch = Channel::new(0);
        let second = sched.spawn(script("b", vec![Op::Recv(ch)], &events));
        assert_ne!(first, second);
        sched.wake(first);
        assert_eq!(sched.run().unwrap_err(), RunError::Deadlock { blocked: 1 });
        assert_eq!(sched.tasks.len(), 1);
    }

    #[test]
    fn test_spawn_from_running_task() {
        let events = log();
        let inner = events.clone();
        let mut spawned = false;
        let mut sched = Scheduler::new();
        sched.spawn(move |cx: &mut TaskContext| {
            if !spawned {
                spawned = true;
                cx.spawn(script("child", vec![Op::Note("ran")], &inner));
                inner.borrow_mut().push("parent: spawned".into());
            }
            Step::Done
        });
        sched.run().unwrap();
        assert_eq!(entries(&events), vec!["parent: spawned", "child: ran"]);
        assert_eq!(sched.live(), 0);
    }
}
