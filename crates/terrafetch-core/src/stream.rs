use std::fmt;

/// Deferred, single-pass work attached to an item by a hook.
///
/// Finite and not restartable: the engine drains it exactly once after the
/// file-stage hook chain, so side-effecting steps are guaranteed to execute
/// even if nothing else consumes their output. Step errors are reported to
/// the drain caller; draining continues past them.
pub struct WorkStream {
    steps: Box<dyn Iterator<Item = anyhow::Result<()>> + Send>,
}

impl WorkStream {
    pub fn new(steps: impl Iterator<Item = anyhow::Result<()>> + Send + 'static) -> Self {
        Self { steps: Box::new(steps) }
    }

    /// A stream built from a list of fallible closures, run lazily in order.
    pub fn from_steps(
        steps: Vec<Box<dyn FnOnce() -> anyhow::Result<()> + Send>>,
    ) -> Self {
        Self::new(steps.into_iter().map(|step| step()))
    }

    /// Consume the stream, returning `(steps_run, errors)`.
    pub fn drain(self) -> (usize, Vec<anyhow::Error>) {
        let mut ran = 0;
        let mut errors = Vec::new();
        for result in self.steps {
            ran += 1;
            if let Err(e) = result {
                errors.push(e);
            }
        }
        (ran, errors)
    }
}

impl fmt::Debug for WorkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkStream { .. }")
    }
}
