//! Shared helpers for the in-crate test suites.

use crate::context::set_rejection_hook;
use crate::task::{Finalizer, Val};
use std::cell::RefCell;
use std::rc::Rc;

/// A call-recording probe. Clones share the same call log, so a spy can be
/// handed into finalizers and mappers and interrogated afterwards.
#[derive(Clone)]
pub(crate) struct Spy {
    calls: Rc<RefCell<Vec<SpyCall>>>,
}

#[derive(Clone, Debug)]
pub(crate) struct SpyCall {
    pub(crate) label: String,
    pub(crate) error: Val,
    pub(crate) result: Val,
}

impl Spy {
    pub(crate) fn new() -> Self {
        Spy {
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn record(&self, label: &str, error: Val, result: Val) {
        self.calls.borrow_mut().push(SpyCall {
            label: label.to_owned(),
            error,
            result,
        });
    }

    pub(crate) fn count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub(crate) fn labels(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.label.clone()).collect()
    }

    pub(crate) fn calls(&self) -> Vec<SpyCall> {
        self.calls.borrow().clone()
    }

    pub(crate) fn finalizer(&self) -> Finalizer {
        self.finalizer_with("")
    }

    pub(crate) fn finalizer_with(&self, label: &str) -> Finalizer {
        let spy = self.clone();
        let label = label.to_owned();
        Box::new(move |error, result| {
            spy.record(&label, error, result);
            Ok(())
        })
    }
}

/// Replaces the unhandled-rejection hook with one that records rejected
/// errors instead of panicking. Tests run one per thread, so there is no
/// hook to restore.
pub(crate) fn capture_rejections() -> Rc<RefCell<Vec<Val>>> {
    let seen: Rc<RefCell<Vec<Val>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let _ = set_rejection_hook(Rc::new(move |task| {
        let error = match task.peek() {
            Err(error) => error,
            _ => Val::Null,
        };
        sink.borrow_mut().push(error);
    }));
    seen
}

/// Extracts a string payload or panics; assertion shorthand.
pub(crate) fn text(value: &Val) -> String {
    value
        .downcast_ref::<String>()
        .cloned()
        .expect("expected a string payload")
}
