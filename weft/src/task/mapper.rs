use crate::task::Val;

/// A user mapper: transforms one `(error, result)` pair into the next.
///
/// "Throwing" is the `Err` arm — a mapper that returns `Err(v)` puts `v` in
/// the downstream error slot, exactly as an uncaught exception would in a
/// language that unwinds.
pub(crate) type MapFull = Box<dyn FnOnce(Val, Val) -> Result<Val, Val>>;

/// A one-sided mapper, used by the `map_err`/`map_ok` conveniences.
pub(crate) type MapHalf = Box<dyn FnOnce(Val) -> Result<Val, Val>>;

/// The mapper capability attached to a task, run once at settle time.
///
/// A small sum instead of always boxing a closure: the common internal
/// variants (`Rethrow`, the one-sided wrappers) carry no allocation beyond
/// the user closure itself, and the dispatch in [`Mapper::run`] is a plain
/// match.
pub(crate) enum Mapper {
    /// The full-pair form, as installed by `Task::map`.
    Full(MapFull),
    /// Runs only when the error slot is set; a success passes through. This
    /// catches: the closure's return value lands in the result slot.
    OnError(MapHalf),
    /// Runs only when the error slot is empty; an error rethrows without
    /// touching the closure.
    OnSuccess(MapHalf),
    /// Observes the pair, then restores it — unless the closure raises, or
    /// returns a task to wait for first.
    Finally(MapFull),
    /// The implicit flattening mapper: whichever side is set becomes the
    /// error. Installed when a task is settled with a nested task in its
    /// error slot.
    Rethrow,
}

impl Mapper {
    pub(crate) fn run(self, error: Val, result: Val) -> Result<Val, Val> {
        match self {
            Mapper::Full(f) => f(error, result),
            Mapper::OnError(f) => {
                if error.is_null() {
                    Ok(result)
                } else {
                    f(error)
                }
            }
            Mapper::OnSuccess(f) => {
                if error.is_null() {
                    f(result)
                } else {
                    Err(error)
                }
            }
            Mapper::Finally(f) => match f(error.clone(), result.clone()) {
                Err(raised) => Err(raised),
                Ok(Val::Task(awaited)) => {
                    // Wait for the returned task, then restore the original
                    // outcome. An error from the awaited task replaces it.
                    let restore = move |after_error: Val, _after_result: Val| {
                        if !after_error.is_null() {
                            Err(after_error)
                        } else if !error.is_null() {
                            Err(error)
                        } else {
                            Ok(result)
                        }
                    };
                    match awaited.map(restore) {
                        Ok(chained) => Ok(Val::Task(chained)),
                        Err(err) => Err(Val::from(err)),
                    }
                }
                Ok(_) => {
                    if error.is_null() {
                        Ok(result)
                    } else {
                        Err(error)
                    }
                }
            },
            Mapper::Rethrow => {
                if error.is_null() {
                    Err(result)
                } else {
                    Err(error)
                }
            }
        }
    }
}
