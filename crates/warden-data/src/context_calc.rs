//! Context accumulation.
//!
//! Which contexts currently apply to a subject is decided outside the core
//! (world the player stands in, server tags, time of day, ...). Each source
//! implements [`ContextCalculator`]; the engine runs all of them to build a
//! subject's active context set.

use std::fmt;
use warden_types::{ContextSet, ContextValue, SubjectRef};

/// Contributes the context values that currently apply to a subject.
pub trait ContextCalculator: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Adds this calculator's values for `subject` to `contexts`.
    fn accumulate(&self, subject: &SubjectRef, contexts: &mut ContextSet);
}

/// Adds the same values for every subject (e.g. `server-tag=lobby`).
#[derive(Debug, Clone, Default)]
pub struct StaticContexts {
    values: Vec<ContextValue>,
}

impl StaticContexts {
    /// Creates a calculator contributing `values`.
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = ContextValue>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl ContextCalculator for StaticContexts {
    fn name(&self) -> &str {
        "static"
    }

    fn accumulate(&self, _subject: &SubjectRef, contexts: &mut ContextSet) {
        contexts.extend(self.values.iter().cloned());
    }
}

/// Adapts a closure into a [`ContextCalculator`].
pub struct FnCalculator<F> {
    name: String,
    f: F,
}

impl<F> FnCalculator<F>
where
    F: Fn(&SubjectRef, &mut ContextSet) + Send + Sync,
{
    /// Wraps `f` under `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnCalculator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCalculator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> ContextCalculator for FnCalculator<F>
where
    F: Fn(&SubjectRef, &mut ContextSet) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accumulate(&self, subject: &SubjectRef, contexts: &mut ContextSet) {
        (self.f)(subject, contexts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_contexts_apply_to_everyone() {
        let calc = StaticContexts::new([ContextValue::new("server-tag", "lobby")]);
        let mut contexts = ContextSet::global();
        calc.accumulate(&SubjectRef::new("user", "a"), &mut contexts);
        assert_eq!(contexts, ContextSet::of([("server-tag", "lobby")]));
    }

    #[test]
    fn closure_calculator_sees_subject() {
        let calc = FnCalculator::new("world", |subject: &SubjectRef, out: &mut ContextSet| {
            if subject.identifier() == "miner" {
                out.insert(ContextValue::new("world", "nether"));
            }
        });
        assert_eq!(calc.name(), "world");

        let mut miner = ContextSet::global();
        calc.accumulate(&SubjectRef::new("user", "miner"), &mut miner);
        assert_eq!(miner, ContextSet::of([("world", "nether")]));

        let mut other = ContextSet::global();
        calc.accumulate(&SubjectRef::new("user", "farmer"), &mut other);
        assert!(other.is_global());
    }
}
