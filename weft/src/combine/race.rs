use crate::combine::{cancel_all, cancel_losers};
use crate::task::{Task, TaskError, Val};
use std::cell::RefCell;
use std::rc::Rc;

struct Entrants {
    out: Task,
    cancels: RefCell<Vec<Task>>,
}

/// Forwards the first observed outcome — error or success — to the output
/// task and cancels every other input.
///
/// Already-decidable entries are inspected in input order during
/// construction: the first plain value or settled task wins outright. An
/// empty list resolves with the null sentinel. Canceling the output cancels
/// every input.
///
/// # Errors
///
/// [`TaskError::Consumed`] when an input task already belongs to another
/// consumer.
pub fn race(list: Vec<Val>) -> Result<Task, TaskError> {
    let out = Task::new();
    if list.is_empty() {
        out.settle(Val::Null, Val::Null)?;
        return Ok(out);
    }

    let cancels: Vec<Task> = list.iter().filter_map(|v| v.task().cloned()).collect();

    for entry in &list {
        match entry {
            Val::Task(input) => {
                if input.is_settled() && !input.is_consumed() {
                    let (errored, value) = input.consume_settled();
                    if errored {
                        out.settle(value, Val::Null)?;
                    } else {
                        out.settle(Val::Null, value)?;
                    }
                    cancel_losers(&cancels, input);
                    return Ok(out);
                }
            }
            value => {
                // A non-task input wins immediately.
                out.settle(Val::Null, value.clone())?;
                cancel_all(&cancels);
                return Ok(out);
            }
        }
    }

    // Everything is an undecided task: first settle wins at flush time.
    let joint = Rc::new(Entrants {
        out: out.clone(),
        cancels: RefCell::new(cancels),
    });
    for entry in &list {
        if let Val::Task(input) = entry {
            attach(&joint, input)?;
        }
    }
    let shared = joint.clone();
    out.set_finalizer(Box::new(move |_error, _result| {
        cancel_all(&shared.cancels.borrow());
        Ok(())
    }));
    Ok(out)
}

fn attach(joint: &Rc<Entrants>, input: &Task) -> Result<(), TaskError> {
    let shared = joint.clone();
    let decider = input.clone();
    let deliver = move |error: Val, result: Val| {
        if shared.out.is_settled() {
            return;
        }
        let _ = shared.out.settle(error, result);
        cancel_losers(&shared.cancels.borrow(), &decider);
    };

    if input.is_pending() && !input.has_finalizer() {
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
