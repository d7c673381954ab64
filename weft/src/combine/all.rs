use crate::combine::{cancel_all, cancel_losers};
use crate::task::{Task, TaskError, Val};
use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

/// Shared coordination state between the output task and the input slots.
struct Joint {
    out: Task,
    slots: RefCell<Vec<Val>>,
    pending: Cell<usize>,
    /// Every task participating in the combination — original inputs plus
    /// any `map`-attached feeders — so one sweep cancels the lot.
    cancels: RefCell<Vec<Task>>,
}

/// Combines a list of values and tasks into one task that settles with the
/// resolved values **in input order**, or with the first error observed.
///
/// An input error short-circuits: the output settles with it immediately and
/// every other input task is canceled on the spot. Canceling the output task
/// likewise cancels every input. An empty list resolves with an empty list.
///
/// # Errors
///
/// [`TaskError::Consumed`] when an input task already belongs to another
/// consumer.
pub fn all(list: Vec<Val>) -> Result<Task, TaskError> {
    let out = Task::new();
    let cancels: Vec<Task> = list.iter().filter_map(|v| v.task().cloned()).collect();
    let joint = Rc::new(Joint {
        out: out.clone(),
        slots: RefCell::new(list),
        pending: Cell::new(0),
        cancels: RefCell::new(cancels),
    });

    let len = joint.slots.borrow().len();
    for index in 0..len {
        let entry = joint.slots.borrow()[index].clone();
        let Val::Task(input) = entry else { continue };

        if input.is_error() {
            let (_, error) = input.consume_settled();
            out.settle(error, Val::Null)?;
            cancel_losers(&joint.cancels.borrow(), &input);
            return Ok(out);
        }
        if input.is_success() && !input.is_consumed() {
            let (_, value) = input.consume_settled();
            joint.slots.borrow_mut()[index] = value;
            continue;
        }
        attach(&joint, index, &input)?;
        joint.pending.set(joint.pending.get() + 1);
    }

    if joint.pending.get() == 0 {
        let slots = mem::take(&mut *joint.slots.borrow_mut());
        out.settle(Val::Null, Val::from(slots))?;
    } else {
        let shared = joint.clone();
        out.set_finalizer(Box::new(move |_error, _result| {
            cancel_all(&shared.cancels.borrow());
            Ok(())
        }));
    }
    Ok(out)
}

fn attach(joint: &Rc<Joint>, index: usize, input: &Task) -> Result<(), TaskError> {
    let shared = joint.clone();
    let decider = input.clone();
    let deliver =
        move |error: Val, result: Val| settle_slot(&shared, index, &decider, error, result);

    if input.is_pending() && !input.has_finalizer() {
        // Free finalizer slot: observe the outcome without allocating a
        // successor task.
        input.set_finalizer(Box::new(move |error, result| {
            deliver(error, result);
            Ok(())
        }));
    } else {
        let fed = input.map(move |error, result| {
            deliver(error, result);
            Ok(Val::Null)
        })?;
        joint.cancels.borrow_mut().push(fed);
    }
    Ok(())
}

fn settle_slot(joint: &Rc<Joint>, index: usize, decider: &Task, error: Val, result: Val) {
    if joint.out.is_settled() {
        return;
    }
    if !error.is_null() {
        let _ = joint.out.settle(error, Val::Null);
        cancel_losers(&joint.cancels.borrow(), decider);
        return;
    }
    joint.slots.borrow_mut()[index] = result;
    let remaining = joint.pending.get() - 1;
    joint.pending.set(remaining);
    if remaining == 0 {
        let slots = mem::take(&mut *joint.slots.borrow_mut());
        let _ = joint.out.settle(Val::Null, Val::from(slots));
    }
}
