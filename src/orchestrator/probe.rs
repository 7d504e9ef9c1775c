//! Probe contract.
//!
//! A probe is a named unit of analysis that runs against a shared input and
//! returns a [`Mutator`]: a deferred write into the composite result. Probes
//! never touch the composite result themselves; only the aggregator applies
//! mutators.
//!
//! Each probe declares the composite fields it writes through
//! [`Probe::fields`]. The registry rejects overlapping claims, which is what
//! makes applying mutators in arrival order safe.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::context::RunContext;

/// Deferred write into the composite result `R`.
pub struct Mutator<R> {
    apply: Box<dyn FnOnce(&mut R) + Send>,
}

impl<R> Mutator<R> {
    /// Wraps a closure that writes this probe's fields.
    pub fn new(apply: impl FnOnce(&mut R) + Send + 'static) -> Self {
        Self {
            apply: Box::new(apply),
        }
    }

    /// Consumes the mutator, writing into `target`.
    pub fn apply(self, target: &mut R) {
        (self.apply)(target)
    }
}

impl<R> fmt::Debug for Mutator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mutator(..)")
    }
}

/// Future returned by [`Probe::run`].
pub type ProbeFuture<R> = BoxFuture<'static, anyhow::Result<Mutator<R>>>;

/// Shared handle to a probe.
pub type ProbeRef<I, R> = Arc<dyn Probe<I, R>>;

/// Contract every probe satisfies to take part in an orchestration run.
///
/// `run` must check [`RunContext::is_cancelled`] before expensive work and
/// should return promptly once the context is canceled. Any subprocess it
/// starts must be bound to the context.
pub trait Probe<I, R>: Send + Sync + 'static {
    /// Unique name, used in logs and warnings.
    fn name(&self) -> &str;

    /// Names of the composite result fields this probe writes.
    fn fields(&self) -> &[&'static str];

    /// Starts one execution of the probe.
    fn run(&self, ctx: RunContext, input: Arc<I>) -> ProbeFuture<R>;
}

/// Closure-backed probe.
///
/// The closure creates a fresh future per run, so no state is shared between
/// runs unless the closure captures it explicitly.
pub struct ProbeFn<F> {
    name: Cow<'static, str>,
    fields: Vec<&'static str>,
    f: F,
}

impl<F> ProbeFn<F> {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        fields: impl IntoIterator<Item = &'static str>,
        f: F,
    ) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().collect(),
            f,
        }
    }
}

impl<F> fmt::Debug for ProbeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeFn")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl<I, R, F, Fut> Probe<I, R> for ProbeFn<F>
where
    I: Send + Sync + 'static,
    R: 'static,
    F: Fn(RunContext, Arc<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Mutator<R>>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    fn run(&self, ctx: RunContext, input: Arc<I>) -> ProbeFuture<R> {
        Box::pin((self.f)(ctx, input))
    }
}
