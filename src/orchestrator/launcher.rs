//! Launcher, supervisor and completion detector.
//!
//! One tokio task per registered probe. Every task reports through one of two
//! bounded queues sized to the probe count: mutators on the result queue,
//! named errors on the error queue. Sends are raced against cancellation, so
//! a producer never blocks once the aggregator has given up.
//!
//! ```text
//! launch ─┬─ supervise(probe 1) ─┐
//!         ├─ supervise(probe 2) ─┼─► results / errors ─► aggregator
//!         └─ supervise(probe N) ─┘
//!              closer: join all N, then drop the last senders (queues close)
//! ```
//!
//! Probe tasks hold clones of the senders. The closer holds the originals and
//! drops them only after joining every task, so both queues close exactly
//! once and only after the last probe has reported.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use crate::error::ProbeError;

use super::context::RunContext;
use super::probe::{Mutator, ProbeRef};
use super::registry::Registry;

/// A mutator tagged with the probe that produced it.
#[derive(Debug)]
pub struct Delivery<R> {
    pub probe: String,
    pub mutator: Mutator<R>,
}

/// Consumer ends of the two queues.
#[derive(Debug)]
pub struct Channels<R> {
    pub results: mpsc::Receiver<Delivery<R>>,
    pub errors: mpsc::Receiver<ProbeError>,
}

/// Knobs for how probes are started.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Individual timeout applied to each probe attempt.
    pub probe_timeout: Option<Duration>,
    /// Upper bound on probes running at the same time.
    pub max_parallel: Option<usize>,
}

/// Starts every probe of `registry` against `input`.
///
/// Must be called from within a tokio runtime. Returns immediately; results
/// arrive on the returned channels.
pub fn launch<I, R>(
    registry: &Registry<I, R>,
    input: Arc<I>,
    ctx: &RunContext,
    options: &LaunchOptions,
) -> Channels<R>
where
    I: Send + Sync + 'static,
    R: Send + 'static,
{
    let capacity = registry.len().max(1);
    let (results_tx, results) = mpsc::channel(capacity);
    let (errors_tx, errors) = mpsc::channel(capacity);

    let permits = options
        .max_parallel
        .filter(|n| *n > 0)
        .map(|n| Arc::new(Semaphore::new(n)));

    let mut tasks = JoinSet::new();
    for probe in registry.iter() {
        let unit = Unit {
            probe: Arc::clone(probe),
            input: Arc::clone(&input),
            ctx: ctx.clone(),
            probe_timeout: options.probe_timeout,
            permits: permits.clone(),
            results: results_tx.clone(),
            errors: errors_tx.clone(),
        };
        tasks.spawn(unit.supervise());
    }

    debug!(probes = registry.len(), "launched probe tasks");
    tokio::spawn(close_when_done(tasks, results_tx, errors_tx));

    Channels { results, errors }
}

/// Waits for every probe task, then closes both queues.
async fn close_when_done<R>(
    mut tasks: JoinSet<()>,
    results: mpsc::Sender<Delivery<R>>,
    errors: mpsc::Sender<ProbeError>,
) {
    let mut finished = 0usize;
    while let Some(joined) = tasks.join_next().await {
        finished += 1;
        if let Err(e) = joined {
            // Panics are caught inside `supervise`; this is an abort.
            error!(error = %e, "probe task did not complete");
        }
    }

    trace!(finished, "all probe tasks finished, closing queues");
    drop(results);
    drop(errors);
}

/// Everything one probe task owns.
struct Unit<I, R> {
    probe: ProbeRef<I, R>,
    input: Arc<I>,
    ctx: RunContext,
    probe_timeout: Option<Duration>,
    permits: Option<Arc<Semaphore>>,
    results: mpsc::Sender<Delivery<R>>,
    errors: mpsc::Sender<ProbeError>,
}

impl<I, R> Unit<I, R>
where
    I: Send + Sync + 'static,
    R: Send + 'static,
{
    async fn supervise(self) {
        let name = self.probe.name().to_string();

        let _permit = match &self.permits {
            Some(permits) => {
                tokio::select! {
                    biased;
                    _ = self.ctx.cancelled() => {
                        debug!(probe = %name, "run canceled while waiting for a slot");
                        return;
                    }
                    permit = Arc::clone(permits).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                }
            }
            None => None,
        };

        if self.ctx.is_cancelled() {
            debug!(probe = %name, "run already canceled, skipping probe");
            return;
        }

        debug!(probe = %name, "probe started");
        match self.execute(&name).await {
            Ok(mutator) => {
                let delivery = Delivery {
                    probe: name.clone(),
                    mutator,
                };
                tokio::select! {
                    biased;
                    _ = self.ctx.cancelled() => {
                        debug!(probe = %name, "run over, dropping probe result");
                    }
                    sent = self.results.send(delivery) => {
                        if sent.is_err() {
                            debug!(probe = %name, "result queue closed, dropping probe result");
                        }
                    }
                }
            }
            Err(err) => {
                let kind = err.as_label();
                tokio::select! {
                    biased;
                    _ = self.ctx.cancelled() => {
                        debug!(probe = %name, kind, "run over, dropping probe error");
                    }
                    sent = self.errors.send(err) => {
                        if sent.is_err() {
                            debug!(probe = %name, "error queue closed, dropping probe error");
                        }
                    }
                }
            }
        }
    }

    /// Runs one attempt of the probe under a child context.
    ///
    /// Everything from deriving the attempt context onwards runs inside the
    /// unwind guard, so any panic is reported under the probe's name.
    async fn execute(&self, name: &str) -> Result<Mutator<R>, ProbeError> {
        let timeout = self.probe_timeout.filter(|d| !d.is_zero());

        let guarded = AssertUnwindSafe(async {
            let attempt = self.ctx.child(timeout);
            let run = self.probe.run(attempt.clone(), Arc::clone(&self.input));

            let outcome = match timeout {
                Some(timeout) => match tokio::time::timeout(timeout, run).await {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => {
                        attempt.cancel();
                        return Err(ProbeError::TimedOut {
                            probe: name.to_string(),
                            timeout,
                        });
                    }
                },
                None => run.await,
            };

            outcome.map_err(|source| ProbeError::Failed {
                probe: name.to_string(),
                source,
            })
        })
        .catch_unwind();

        match guarded.await {
            Ok(result) => result,
            Err(panic) => Err(ProbeError::Panicked {
                probe: name.to_string(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
