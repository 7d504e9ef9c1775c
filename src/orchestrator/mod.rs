//! Parallel probe orchestrator.
//!
//! Runs every probe of a [`Registry`] concurrently against one shared input,
//! merges their [`Mutator`]s into a single composite result, survives
//! individual probe failures, and gives up waiting once the run deadline
//! passes.
//!
//! ## Run lifecycle
//!
//! ```text
//! Idle ─► Running ─┬─► AllCompleted ─────┐
//!                  ├─► DeadlineExceeded ─┼─► Returned(complete | partial)
//!                  └─► Cancelled ────────┘
//! ```
//!
//! ## Guarantees
//! - The composite result has exactly one writer, the [`Aggregator`].
//! - A mutator is applied at most once, and only when its probe succeeded.
//! - A result is always returned once the registry is valid, even if every
//!   probe fails or the deadline passes before any probe finishes.
//! - A failed probe contributes no fields, one `warn!` log line and one
//!   [`ProbeWarning`]. It never affects other probes.
//!
//! Cancellation is cooperative. A probe that ignores its context keeps
//! running in the background after the call returned; its late result is
//! dropped without blocking.

pub mod aggregator;
pub mod context;
pub mod launcher;
pub mod probe;
pub mod registry;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::RegistryError;

pub use aggregator::Aggregator;
pub use context::RunContext;
pub use launcher::LaunchOptions;
pub use probe::{Mutator, Probe, ProbeFn};
pub use registry::Registry;

/// Default deadline for a whole run.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every probe reported before the deadline.
    AllCompleted,
    /// The deadline passed first; the result is partial.
    DeadlineExceeded,
    /// The caller canceled the run; the result is partial.
    Cancelled,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunOutcome::AllCompleted)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::AllCompleted => write!(f, "all completed"),
            RunOutcome::DeadlineExceeded => write!(f, "deadline exceeded"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A probe that did not contribute to the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeWarning {
    pub probe: String,
    /// Stable label, e.g. `probe_failed` or `probe_pending`.
    pub kind: String,
    pub message: String,
}

/// Bookkeeping the aggregator attaches to every result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Probes whose mutator was applied.
    pub applied: Vec<String>,
    /// Probes that reported an error.
    pub failed: Vec<String>,
    /// Probes that had not reported when the run ended.
    pub pending: Vec<String>,
    pub warnings: Vec<ProbeWarning>,
    pub elapsed_ms: u64,
}

/// Composite result returned by [`Orchestrator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct CompositeResult<R> {
    /// Zero-valued fields belong to probes that failed or did not finish.
    pub data: R,
    pub summary: RunSummary,
}

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard wall-clock limit for the whole run.
    pub deadline: Duration,
    /// Optional limit for each probe attempt.
    pub probe_timeout: Option<Duration>,
    /// Optional cap on concurrently running probes.
    pub max_parallel: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            probe_timeout: None,
            max_parallel: None,
        }
    }
}

/// Fan-out/fan-in runner for a probe registry.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs every probe in `registry` against `input`.
    ///
    /// Only fails when the run cannot start (invalid registry or zero
    /// deadline). Probe failures, the deadline, and cancellation of `parent`
    /// all yield a (possibly partial) result instead.
    pub async fn run<I, R>(
        &self,
        input: Arc<I>,
        registry: &Registry<I, R>,
        parent: &CancellationToken,
    ) -> Result<CompositeResult<R>, RegistryError>
    where
        I: Send + Sync + 'static,
        R: Default + Send + 'static,
    {
        if self.config.deadline.is_zero() {
            return Err(RegistryError::ZeroDeadline);
        }
        registry.validate()?;

        let started = Instant::now();
        let ctx = RunContext::new(parent, self.config.deadline);

        info!(
            probes = registry.len(),
            deadline_secs = self.config.deadline.as_secs_f64(),
            "starting probe run"
        );

        let options = LaunchOptions {
            probe_timeout: self.config.probe_timeout,
            max_parallel: self.config.max_parallel,
        };
        let channels = launcher::launch(registry, input, &ctx, &options);

        let expected = registry.names().into_iter().map(String::from).collect();
        Ok(Aggregator::new(expected, started).run(channels, &ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::probe::ProbeRef;
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Sample {
        foo: i32,
        bar: i32,
        baz: i32,
    }

    fn orchestrator(deadline: Duration) -> Orchestrator {
        Orchestrator::new(OrchestratorConfig {
            deadline,
            ..OrchestratorConfig::default()
        })
    }

    fn setter(
        name: &'static str,
        field: &'static str,
        delay: Duration,
        apply: fn(&mut Sample),
    ) -> ProbeRef<(), Sample> {
        Arc::new(ProbeFn::new(name, [field], move |ctx: RunContext, _input: Arc<()>| async move {
            tokio::select! {
                _ = ctx.cancelled() => anyhow::bail!("canceled"),
                _ = tokio::time::sleep(delay) => {}
            }
            Ok(Mutator::new(apply))
        }))
    }

    fn failing(name: &'static str, message: &'static str) -> ProbeRef<(), Sample> {
        Arc::new(ProbeFn::new(name, [], move |_ctx: RunContext, _input: Arc<()>| async move {
            Err::<Mutator<Sample>, _>(anyhow::anyhow!(message))
        }))
    }

    #[tokio::test]
    async fn test_deadline_scenario_returns_partial_result() {
        let mut registry = Registry::new();
        registry.push(setter("a", "foo", Duration::ZERO, |s| s.foo = 1));
        registry.push(failing("b", "bad"));
        registry.push(Arc::new(ProbeFn::new(
            "c",
            ["bar"],
            |_ctx: RunContext, _input: Arc<()>| async {
                // Ignores cancellation on purpose.
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, anyhow::Error>(Mutator::new(|s: &mut Sample| s.bar = 2))
            },
        )));

        let started = std::time::Instant::now();
        let result = orchestrator(Duration::from_secs(1))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.data.foo, 1);
        assert_eq!(result.data.bar, 0);
        assert_eq!(result.summary.outcome, RunOutcome::DeadlineExceeded);
        assert_eq!(result.summary.failed, vec!["b".to_string()]);
        assert_eq!(result.summary.pending, vec!["c".to_string()]);
        assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");

        let failures: Vec<_> = result
            .summary
            .warnings
            .iter()
            .filter(|w| w.kind == "probe_failed")
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].probe, "b");
        assert!(failures[0].message.contains("bad"));
    }

    /// In-memory log sink for the fmt subscriber.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_failed_probe_logs_one_warning() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut registry = Registry::new();
        registry.push(setter("a", "foo", Duration::ZERO, |s| s.foo = 1));
        registry.push(failing("b", "bad"));
        registry.push(setter("c", "bar", Duration::from_secs(30), |s| s.bar = 2));

        let result = orchestrator(Duration::from_millis(300))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.summary.outcome, RunOutcome::DeadlineExceeded);

        let failures: Vec<String> = logs
            .lines()
            .into_iter()
            .filter(|line| line.contains("probe failed"))
            .collect();
        assert_eq!(failures.len(), 1, "{failures:?}");
        assert!(failures[0].contains("WARN"), "{}", failures[0]);
        assert!(failures[0].contains("probe=b"), "{}", failures[0]);
        assert!(failures[0].contains("kind=\"probe_failed\""), "{}", failures[0]);
    }

    #[tokio::test]
    async fn test_huge_deadline_completes() {
        let mut registry = Registry::new();
        registry.push(setter("a", "foo", Duration::ZERO, |s| s.foo = 1));
        registry.push(setter("b", "bar", Duration::from_millis(5), |s| s.bar = 2));

        let orchestrator = Orchestrator::new(OrchestratorConfig {
            deadline: Duration::from_secs(u64::MAX),
            probe_timeout: Some(Duration::from_secs(u64::MAX)),
            max_parallel: None,
        });
        let result = orchestrator
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.summary.outcome, RunOutcome::AllCompleted);
        assert_eq!(result.data.foo, 1);
        assert_eq!(result.data.bar, 2);
        assert!(result.summary.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_all_completed() {
        let mut registry = Registry::new();
        registry.push(setter("a", "foo", Duration::ZERO, |s| s.foo = 1));
        registry.push(setter("b", "bar", Duration::from_millis(10), |s| s.bar = 2));
        registry.push(setter("c", "baz", Duration::from_millis(5), |s| s.baz = 3));

        let result = orchestrator(Duration::from_secs(5))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.summary.outcome, RunOutcome::AllCompleted);
        assert!(result.summary.outcome.is_complete());
        assert_eq!(
            result.data,
            Sample {
                foo: 1,
                bar: 2,
                baz: 3
            }
        );
        assert!(result.summary.warnings.is_empty());
        assert_eq!(result.summary.applied.len(), 3);
    }

    #[tokio::test]
    async fn test_order_independence() {
        let delays = [
            [0u64, 10, 20],
            [20, 10, 0],
            [10, 0, 20],
            [0, 0, 0],
        ];

        let mut results = Vec::new();
        for d in delays {
            let mut registry = Registry::new();
            registry.push(setter("a", "foo", Duration::from_millis(d[0]), |s| s.foo = 1));
            registry.push(setter("b", "bar", Duration::from_millis(d[1]), |s| s.bar = 2));
            registry.push(setter("c", "baz", Duration::from_millis(d[2]), |s| s.baz = 3));

            let result = orchestrator(Duration::from_secs(5))
                .run(Arc::new(()), &registry, &CancellationToken::new())
                .await
                .unwrap();
            results.push(result.data);
        }

        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_partial_tolerance() {
        let mut registry = Registry::new();
        registry.push(setter("a", "foo", Duration::from_millis(5), |s| s.foo = 1));
        registry.push(failing("b", "broken"));
        registry.push(setter("c", "baz", Duration::ZERO, |s| s.baz = 3));
        registry.push(failing("d", "also broken"));

        let result = orchestrator(Duration::from_secs(5))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.summary.outcome, RunOutcome::AllCompleted);
        assert_eq!(
            result.data,
            Sample {
                foo: 1,
                bar: 0,
                baz: 3
            }
        );
        assert_eq!(result.summary.failed, vec!["b".to_string(), "d".to_string()]);
        assert_eq!(result.summary.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_every_probe_fails() {
        let mut registry = Registry::new();
        registry.push(failing("a", "x"));
        registry.push(failing("b", "y"));

        let result = orchestrator(Duration::from_secs(5))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.data, Sample::default());
        assert_eq!(result.summary.outcome, RunOutcome::AllCompleted);
        assert!(result.summary.applied.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_before_any_probe_finishes() {
        let mut registry = Registry::new();
        for (name, field) in [("a", "foo"), ("b", "bar"), ("c", "baz")] {
            registry.push(setter(name, field, Duration::from_secs(30), |s| s.foo = 9));
        }

        let started = std::time::Instant::now();
        let result = orchestrator(Duration::from_millis(200))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.data, Sample::default());
        assert_eq!(result.summary.outcome, RunOutcome::DeadlineExceeded);
        assert_eq!(result.summary.pending.len(), 3);
    }

    #[tokio::test]
    async fn test_each_mutator_applied_exactly_once() {
        let applications = Arc::new(AtomicUsize::new(0));

        let mut registry: Registry<(), Sample> = Registry::new();
        for name in ["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"] {
            let applications = Arc::clone(&applications);
            let fail = name == "p3" || name == "p6";
            registry.push(Arc::new(ProbeFn::new(name, [name], move |_ctx: RunContext, _i: Arc<()>| {
                let applications = Arc::clone(&applications);
                async move {
                    if fail {
                        anyhow::bail!("no data");
                    }
                    Ok(Mutator::new(move |s: &mut Sample| {
                        applications.fetch_add(1, Ordering::SeqCst);
                        s.foo += 1;
                    }))
                }
            })));
        }

        let result = orchestrator(Duration::from_secs(5))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(applications.load(Ordering::SeqCst), 6);
        assert_eq!(result.data.foo, 6);
        assert_eq!(result.summary.applied.len(), 6);
        assert_eq!(result.summary.failed.len(), 2);
    }

    /// Counts how many undelivered results were dropped by their producer.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_slow_producers_never_block_after_return() {
        const NAMES: [&str; 16] = [
            "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "s12",
            "s13", "s14", "s15",
        ];
        let dropped = Arc::new(AtomicUsize::new(0));

        let mut registry: Registry<(), Sample> = Registry::new();
        for name in NAMES {
            let dropped = Arc::clone(&dropped);
            registry.push(Arc::new(ProbeFn::new(name, [name], move |_ctx: RunContext, _i: Arc<()>| {
                let guard = DropCounter(Arc::clone(&dropped));
                async move {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok::<_, anyhow::Error>(Mutator::new(move |s: &mut Sample| {
                        let _guard = guard;
                        s.foo += 1;
                    }))
                }
            })));
        }

        let result = orchestrator(Duration::from_millis(50))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.summary.outcome, RunOutcome::DeadlineExceeded);
        assert_eq!(result.data.foo, 0);

        // Each late producer gives up on its send and drops the result.
        tokio::time::timeout(Duration::from_secs(2), async {
            while dropped.load(Ordering::SeqCst) < NAMES.len() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("producers stalled on send");
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let parent = CancellationToken::new();
        let mut registry = Registry::new();
        registry.push(setter("a", "foo", Duration::ZERO, |s| s.foo = 1));
        registry.push(setter("b", "bar", Duration::from_secs(30), |s| s.bar = 2));

        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = orchestrator(Duration::from_secs(30))
            .run(Arc::new(()), &registry, &parent)
            .await
            .unwrap();

        assert_eq!(result.summary.outcome, RunOutcome::Cancelled);
        assert_eq!(result.data.foo, 1);
        assert_eq!(result.data.bar, 0);
    }

    #[tokio::test]
    async fn test_invalid_registry_is_the_only_error() {
        let registry: Registry<(), Sample> = Registry::new();
        let err = orchestrator(Duration::from_secs(1))
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Empty);

        let mut registry = Registry::new();
        registry.push(setter("a", "foo", Duration::ZERO, |s| s.foo = 1));
        let err = orchestrator(Duration::ZERO)
            .run(Arc::new(()), &registry, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::ZeroDeadline);
    }

    #[test]
    fn test_outcome_display_and_serialize() {
        assert_eq!(RunOutcome::DeadlineExceeded.to_string(), "deadline exceeded");
        let json = serde_json::to_string(&RunOutcome::AllCompleted).unwrap();
        assert_eq!(json, "\"all_completed\"");
    }
}
