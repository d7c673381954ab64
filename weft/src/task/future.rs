use crate::task::{Task, TaskError, Val};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A [`Task`] adapted to the host promise type, `std::future::Future`.
///
/// Resolves to `Ok(result)` or `Err(error)` once the scheduler has flushed
/// the task's outcome. The conversion consumes the task — it is the unique
/// downstream consumer — and the cancelable contract carries over:
/// **dropping an unresolved `TaskFuture` cancels the chain**, running
/// upstream finalizers before the drop returns.
///
/// The reverse adaptation is deliberately absent: an arbitrary future gives
/// the library nothing to cancel, so wrapping one could only pretend at
/// cancelation. Drive external work through [`Task::settle`] instead.
pub struct TaskFuture {
    shared: Rc<Shared>,
    chain: Task,
    resolved: Cell<bool>,
}

struct Shared {
    outcome: RefCell<Option<(Val, Val)>>,
    waker: RefCell<Option<Waker>>,
}

impl Task {
    /// Converts the task into a future, consuming it.
    ///
    /// # Errors
    ///
    /// [`TaskError::Consumed`] when the task already has a consumer.
    pub fn into_future(self) -> Result<TaskFuture, TaskError> {
        let shared = Rc::new(Shared {
            outcome: RefCell::new(None),
            waker: RefCell::new(None),
        });
        let recorder = shared.clone();
        let chain = self.map(move |error, result| {
            *recorder.outcome.borrow_mut() = Some((error, result));
            if let Some(waker) = recorder.waker.borrow_mut().take() {
                waker.wake();
            }
            Ok(Val::Null)
        })?;
        Ok(TaskFuture {
            shared,
            chain,
            resolved: Cell::new(false),
        })
    }
}

impl Future for TaskFuture {
    type Output = Result<Val, Val>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some((error, result)) = this.shared.outcome.borrow_mut().take() {
            this.resolved.set(true);
            return Poll::Ready(if error.is_null() {
                Ok(result)
            } else {
                Err(error)
            });
        }
        *this.shared.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for TaskFuture {
    fn drop(&mut self) {
        if !self.resolved.get() && self.shared.outcome.borrow().is_none() {
            let _ = self.chain.cancel();
        }
    }
}
