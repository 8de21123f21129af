use std::time::Duration;

use crate::unwind::Panic;

pub type TaskId = usize;

/// Outcome of resuming a task once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Still runnable; goes to the back of the run queue.
    Yield,
    /// Suspended until an operation it registered with wakes it.
    Blocked,
    Done,
    /// An unrecovered panic. Ends the whole run.
    Panic(Panic),
}

/// A goroutine: an explicit state machine the scheduler resumes until it is
/// done. `resume` must return [`Step::Blocked`] only after registering with
/// something that will wake it (a channel, a select, a timer).
pub trait Task {
    fn resume(&mut self, cx: &mut TaskContext) -> Step;
}

impl<F> Task for F
where
    F: FnMut(&mut TaskContext) -> Step,
{
    fn resume(&mut self, cx: &mut TaskContext) -> Step {
        self(cx)
    }
}

/// Work scheduled when a timer expires.
pub(crate) enum TimerAction {
    Wake(TaskId),
    Fire(Box<dyn FnOnce(Duration, &mut Vec<TaskId>)>),
}

/// Handed to a task while it runs. Collects the side effects of the step
/// for the scheduler to apply afterwards.
pub struct TaskContext {
    current: TaskId,
    now: Duration,
    pub(crate) woken: Vec<TaskId>,
    pub(crate) timers: Vec<(Duration, TimerAction)>,
    pub(crate) spawned: Vec<Box<dyn Task>>,
}

impl TaskContext {
    pub(crate) fn new(current: TaskId, now: Duration) -> Self {
        Self {
            current,
            now,
            woken: Vec::new(),
            timers: Vec::new(),
            spawned: Vec::new(),
        }
    }

    pub fn current(&self) -> TaskId {
        self.current
    }

    /// Virtual time since the scheduler started.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Start a new goroutine. It runs after the current step.
    pub fn spawn(&mut self, task: impl Task + 'static) {
        self.spawned.push(Box::new(task));
    }

    pub(crate) fn add_timer(&mut self, deadline: Duration, action: TimerAction) {
        self.timers.push((deadline, action));
    }
}
