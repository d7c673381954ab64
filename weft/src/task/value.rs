use crate::task::Task;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A dynamically typed outcome value.
///
/// Every task settles with an `(error, result)` pair of `Val`s, of which at
/// most one is meaningful; `Val::Null` is the sentinel for "nothing here".
/// Payloads are reference-counted so the same outcome can be handed to a
/// successor and to any number of weak branches without copying.
///
/// A `Val::Task` in either slot is not data: settling with a nested task
/// chains onto it instead (see [`Task::settle`]).
#[derive(Clone)]
pub enum Val {
    /// The null sentinel. The only value that is "falsy" to `settle`.
    Null,
    /// The stable cancelation tag. A still-pending task that is canceled
    /// settles with this in its error slot; detect it with
    /// [`Val::is_canceled`].
    Canceled,
    /// An arbitrary shared payload.
    Data(Rc<dyn Any>),
    /// An ordered sequence, e.g. the output of [`crate::all`].
    List(Rc<Vec<Val>>),
    /// A nested task; triggers flattening when passed to `settle`.
    Task(Task),
}

impl Val {
    /// Wraps any `'static` payload.
    pub fn of<T: Any>(value: T) -> Val {
        Val::Data(Rc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Val::Canceled)
    }

    /// Borrows the payload if this is `Data` of the exact type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Val::Data(data) => data.downcast_ref(),
            _ => None,
        }
    }

    /// Borrows the elements if this is a `List`.
    pub fn list(&self) -> Option<&[Val]> {
        match self {
            Val::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrows the nested task if this is a `Task`.
    pub fn task(&self) -> Option<&Task> {
        match self {
            Val::Task(task) => Some(task),
            _ => None,
        }
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Val {
        Val::of(s.to_owned())
    }
}

impl From<String> for Val {
    fn from(s: String) -> Val {
        Val::of(s)
    }
}

impl From<i64> for Val {
    fn from(n: i64) -> Val {
        Val::of(n)
    }
}

impl From<f64> for Val {
    fn from(n: f64) -> Val {
        Val::of(n)
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Val {
        Val::of(b)
    }
}

impl From<()> for Val {
    fn from(_: ()) -> Val {
        Val::Null
    }
}

impl From<Vec<Val>> for Val {
    fn from(items: Vec<Val>) -> Val {
        Val::List(Rc::new(items))
    }
}

impl From<Task> for Val {
    fn from(task: Task) -> Val {
        Val::Task(task)
    }
}

// Literal comparisons keep test assertions terse; anything not covered here
// goes through `downcast_ref`.
impl PartialEq<&str> for Val {
    fn eq(&self, other: &&str) -> bool {
        self.downcast_ref::<String>().is_some_and(|s| s == *other)
    }
}

impl PartialEq<i64> for Val {
    fn eq(&self, other: &i64) -> bool {
        self.downcast_ref::<i64>().is_some_and(|n| n == other)
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => f.write_str("Null"),
            Val::Canceled => f.write_str("Canceled"),
            Val::Task(task) => write!(f, "Task({})", task.id()),
            Val::List(items) => f.debug_list().entries(items.iter()).finish(),
            Val::Data(data) => {
                if let Some(s) = data.downcast_ref::<String>() {
                    write!(f, "{:?}", s)
                } else if let Some(n) = data.downcast_ref::<i64>() {
                    write!(f, "{}", n)
                } else if let Some(n) = data.downcast_ref::<f64>() {
                    write!(f, "{}", n)
                } else if let Some(b) = data.downcast_ref::<bool>() {
                    write!(f, "{}", b)
                } else {
                    f.write_str("Data(..)")
                }
            }
        }
    }
}
