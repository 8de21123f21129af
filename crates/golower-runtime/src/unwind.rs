//! Deferred calls, panics and recover.
//!
//! Each function call gets a frame on the [`DeferStack`]. Deferred closures
//! run in reverse registration order when the frame returns, whether it
//! returns normally or by panicking. A deferred closure receives an
//! [`Unwind`] for its own frame, so `recover` is only effective when called
//! directly from a deferred call of the panicking frame.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Panic {
    /// `panic(v)` from user code.
    #[error("panic: {0}")]
    Value(String),
    /// A fault raised by the runtime itself.
    #[error("panic: runtime error: {0}")]
    Runtime(String),
}

impl Panic {
    pub fn value(v: impl Into<String>) -> Self {
        Panic::Value(v.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Panic::Runtime(msg.into())
    }

    pub(crate) fn send_on_closed() -> Self {
        Panic::runtime("send on closed channel")
    }
}

type Deferred = Box<dyn FnOnce(&mut DeferStack, &mut Unwind) -> Result<(), Panic>>;

/// Panic state visible to a deferred call.
#[derive(Debug, Default)]
pub struct Unwind {
    panic: Option<Panic>,
}

impl Unwind {
    /// Stop the in-flight panic of this frame and return its value.
    pub fn recover(&mut self) -> Option<Panic> {
        self.panic.take()
    }

    pub fn is_panicking(&self) -> bool {
        self.panic.is_some()
    }
}

#[derive(Default)]
pub struct DeferStack {
    frames: Vec<Vec<Deferred>>,
}

impl DeferStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Register a call to run when the innermost frame returns.
    pub fn defer(
        &mut self,
        f: impl FnOnce(&mut DeferStack, &mut Unwind) -> Result<(), Panic> + 'static,
    ) {
        match self.frames.last_mut() {
            Some(frame) => frame.push(Box::new(f)),
            None => tracing::warn!("defer outside of any frame ignored"),
        }
    }

    /// Run `body` as a function call with its own frame.
    ///
    /// Returns `Ok(Some(result))` on normal return and `Ok(None)` when a
    /// panic was recovered by one of the frame's deferred calls, in which
    /// case the caller sees the function's zero results.
    pub fn call<R>(
        &mut self,
        body: impl FnOnce(&mut DeferStack) -> Result<R, Panic>,
    ) -> Result<Option<R>, Panic> {
        self.frames.push(Vec::new());
        let outcome = body(self);
        let deferred = self.frames.pop().unwrap_or_default();
        let (mut result, mut panic) = match outcome {
            Ok(r) => (Some(r), None),
            Err(p) => (None, Some(p)),
        };
        for call in deferred.into_iter().rev() {
            let mut unwind = Unwind { panic: panic.take() };
            match call(self, &mut unwind) {
                Ok(()) => panic = unwind.panic,
                // A panic inside a deferred call replaces the one in flight.
                Err(p) => panic = Some(p),
            }
        }
        match panic {
            Some(p) => Err(p),
            None => {
                if result.is_none() {
                    tracing::debug!("panic recovered");
                }
                Ok(result.take())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_deferred_calls_run_in_reverse() {
        let events = log();
        let mut stack = DeferStack::new();
        let result = stack.call(|s| {
            for i in 0..3 {
                let events = events.clone();
                s.defer(move |_, _| {
                    events.borrow_mut().push(format!("deferred {i}"));
                    Ok(())
                });
            }
            events.borrow_mut().push("body".into());
            Ok(7)
        });
        assert_eq!(result, Ok(Some(7)));
        assert_eq!(
            *events.borrow(),
            vec!["body", "deferred 2", "deferred 1", "deferred 0"]
        );
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_deferred_calls_run_on_panic() {
        let events = log();
        let mut stack = DeferStack::new();
        let e = events.clone();
        let result: Result<Option<()>, Panic> = stack.call(move |s| {
            s.defer(move |_, unwind| {
                e.borrow_mut().push(format!("panicking={}", unwind.is_panicking()));
                Ok(())
            });
            Err(Panic::value("boom"))
        });
        assert_eq!(result, Err(Panic::value("boom")));
        assert_eq!(*events.borrow(), vec!["panicking=true"]);
    }

    #[test]
    fn test_recover_clears_panic() {
        let recovered = Rc::new(RefCell::new(None));
        let r = recovered.clone();
        let mut stack = DeferStack::new();
        let result: Result<Option<i32>, Panic> = stack.call(move |s| {
            s.defer(move |_, unwind| {
                *r.borrow_mut() = unwind.recover();
                Ok(())
            });
            Err(Panic::value("boom"))
        });
        assert_eq!(result, Ok(None));
        assert_eq!(*recovered.borrow(), Some(Panic::value("boom")));
    }

    #[test]
    fn test_recover_in_nested_call_is_ineffective() {
        let mut stack = DeferStack::new();
        let result: Result<Option<()>, Panic> = stack.call(|s| {
            s.defer(|stack, _unwind| {
                // A function called by the deferred function has its own frame.
                stack
                    .call(|inner| {
                        inner.defer(|_, unwind| {
                            assert!(unwind.recover().is_none());
                            Ok(())
                        });
                        Ok(())
                    })
                    .map(|_| ())
            });
            Err(Panic::value("boom"))
        });
        assert_eq!(result, Err(Panic::value("boom")));
    }

    #[test]
    fn test_panic_in_deferred_call_replaces_current() {
        let mut stack = DeferStack::new();
        let result: Result<Option<()>, Panic> = stack.call(|s| {
            s.defer(|_, _| Err(Panic::value("second")));
            Err(Panic::value("first"))
        });
        assert_eq!(result, Err(Panic::value("second")));
        assert_eq!(Panic::runtime("x").to_string(), "panic: runtime error: x");
    }
}
