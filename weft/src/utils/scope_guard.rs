/// A guard that executes a closure when it goes out of scope.
///
/// Used wherever a step must run even if an earlier step panics: the
/// scheduler re-arms its host callback when a drain is interrupted, and
/// cancelation guarantees the upstream walk continues past a panicking
/// finalizer. The guard is armed on creation and runs its closure on drop
/// unless explicitly disarmed.
#[must_use]
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Wrapped in an `Option` so the closure can be taken out exactly once,
    // on drop or on disarm, never both.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }

    /// Prevents the closure from running when the guard is dropped.
    pub(crate) fn disarm(&mut self) {
        self.closure.take();
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_runs_on_drop() {
        let fired = Cell::new(false);
        {
            let _guard = ScopeGuard::new(|| fired.set(true));
            assert!(!fired.get());
        }
        assert!(fired.get());
    }

    #[test]
    fn test_disarmed_guard_does_nothing() {
        let fired = Cell::new(false);
        {
            let mut guard = ScopeGuard::new(|| fired.set(true));
            guard.disarm();
        }
        assert!(!fired.get());
    }
}
