//! Sleeping and timeouts on the scheduler's virtual clock.

use std::task::Poll;
use std::time::Duration;

use crate::chan::Channel;
use crate::task::{TaskContext, TimerAction};

/// `time.Sleep(d)`.
pub struct SleepOp {
    duration: Duration,
    deadline: Option<Duration>,
}

pub fn sleep(duration: Duration) -> SleepOp {
    SleepOp {
        duration,
        deadline: None,
    }
}

impl SleepOp {
    pub fn poll(&mut self, cx: &mut TaskContext) -> Poll<()> {
        match self.deadline {
            Some(deadline) if cx.now() >= deadline => Poll::Ready(()),
            Some(_) => Poll::Pending,
            None if self.duration.is_zero() => Poll::Ready(()),
            None => {
                let deadline = cx.now() + self.duration;
                self.deadline = Some(deadline);
                let task = cx.current();
                cx.add_timer(deadline, TimerAction::Wake(task));
                Poll::Pending
            }
        }
    }
}

/// `time.After(d)`: a channel that receives the clock reading once `d` has
/// elapsed. Racing it in a select gives a timeout.
pub fn after(cx: &mut TaskContext, duration: Duration) -> Channel<Duration> {
    let chan = Channel::new(1);
    let sender = chan.clone();
    cx.add_timer(
        cx.now() + duration,
        TimerAction::Fire(Box::new(move |now, woken| {
            if sender.try_send(now, woken).is_err() {
                tracing::debug!("timer channel full");
            }
        })),
    );
    chan
}
