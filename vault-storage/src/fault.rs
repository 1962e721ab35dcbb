//! Deterministic crash injection for exercising `BackupJournal::rollback_pending`,
//! available only to this crate's own test suite.

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::Cell;

    thread_local! {
        static CRASH_AFTER_WRITES: Cell<Option<usize>> = Cell::new(None);
    }

    /// Arranges for the next multi-file commit on this thread to stop after
    /// `n` of its `SaveDataFile` calls have completed, simulating a crash
    /// mid-commit.
    pub fn crash_after_writes(n: usize) {
        CRASH_AFTER_WRITES.with(|c| c.set(Some(n)));
    }

    pub fn clear() {
        CRASH_AFTER_WRITES.with(|c| c.set(None));
    }

    pub(crate) fn should_crash_after(completed: usize) -> bool {
        CRASH_AFTER_WRITES.with(|c| c.get() == Some(completed))
    }
}

#[cfg(test)]
pub(crate) fn maybe_crash(completed: usize) -> Result<(), crate::error::Error> {
    if test_support::should_crash_after(completed) {
        test_support::clear();
        return Err(crate::error::Error::SimulatedCrash);
    }
    Ok(())
}

#[cfg(not(test))]
pub(crate) fn maybe_crash(_completed: usize) -> Result<(), crate::error::Error> {
    Ok(())
}
