//! Single-writer aggregation loop.
//!
//! The aggregator is the only code that ever holds `&mut R`. It drains the
//! result and error queues until both are closed, or until the run is
//! canceled or its deadline passes, whichever happens first.

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProbeError;

use super::context::RunContext;
use super::launcher::{Channels, Delivery};
use super::{CompositeResult, ProbeWarning, RunOutcome, RunSummary};

/// Owns the composite result for the length of one run.
pub struct Aggregator<R> {
    data: R,
    expected: Vec<String>,
    applied: BTreeSet<String>,
    failed: BTreeSet<String>,
    warnings: Vec<ProbeWarning>,
    started: Instant,
}

impl<R: Default> Aggregator<R> {
    /// Starts with a zero-valued composite for the named probes.
    pub fn new(expected: Vec<String>, started: Instant) -> Self {
        Self {
            data: R::default(),
            expected,
            applied: BTreeSet::new(),
            failed: BTreeSet::new(),
            warnings: Vec::new(),
            started,
        }
    }

    /// Drains `channels` under `ctx` and returns whatever was aggregated.
    ///
    /// The run context is canceled before returning so that probes still in
    /// flight stop and never block on a send.
    pub async fn run(mut self, channels: Channels<R>, ctx: &RunContext) -> CompositeResult<R> {
        let mut results = Some(channels.results);
        let mut errors = Some(channels.errors);

        let deadline = tokio::time::sleep_until(ctx.deadline());
        tokio::pin!(deadline);

        let outcome = loop {
            if results.is_none() && errors.is_none() {
                break RunOutcome::AllCompleted;
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => break RunOutcome::Cancelled,
                _ = &mut deadline => break RunOutcome::DeadlineExceeded,
                delivery = recv(&mut results), if results.is_some() => match delivery {
                    Some(delivery) => self.apply(delivery),
                    None => {
                        debug!("result queue closed");
                        results = None;
                    }
                },
                err = recv(&mut errors), if errors.is_some() => match err {
                    Some(err) => self.record(err),
                    None => {
                        debug!("error queue closed");
                        errors = None;
                    }
                },
            }
        };

        ctx.cancel();
        self.finish(outcome)
    }

    fn apply(&mut self, delivery: Delivery<R>) {
        let Delivery { probe, mutator } = delivery;

        if self.failed.contains(&probe) || !self.applied.insert(probe.clone()) {
            self.record(ProbeError::DuplicateResult { probe });
            return;
        }

        mutator.apply(&mut self.data);
        debug!(probe = %probe, "applied probe result");
    }

    fn record(&mut self, err: ProbeError) {
        warn!(probe = %err.probe(), kind = err.as_label(), error = %err, "probe failed");

        if !self.applied.contains(err.probe()) {
            self.failed.insert(err.probe().to_string());
        }
        self.warnings.push(ProbeWarning {
            probe: err.probe().to_string(),
            kind: err.as_label().to_string(),
            message: err.to_string(),
        });
    }

    fn finish(mut self, outcome: RunOutcome) -> CompositeResult<R> {
        if outcome == RunOutcome::AllCompleted {
            // Both queues closed, so a silent probe's task is gone for good.
            let lost: Vec<String> = self
                .expected
                .iter()
                .filter(|name| !self.applied.contains(*name) && !self.failed.contains(*name))
                .cloned()
                .collect();
            for probe in lost {
                self.record(ProbeError::Lost { probe });
            }
        }

        let pending: Vec<String> = self
            .expected
            .iter()
            .filter(|name| !self.applied.contains(*name) && !self.failed.contains(*name))
            .cloned()
            .collect();

        let elapsed = self.started.elapsed();
        match outcome {
            RunOutcome::AllCompleted => info!(
                applied = self.applied.len(),
                failed = self.failed.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "probe run complete"
            ),
            RunOutcome::DeadlineExceeded | RunOutcome::Cancelled => warn!(
                outcome = %outcome,
                applied = self.applied.len(),
                failed = self.failed.len(),
                pending = ?pending,
                elapsed_ms = elapsed.as_millis() as u64,
                "probe run ended early, returning partial result"
            ),
        }

        let mut warnings = self.warnings;
        warnings.extend(pending.iter().map(|probe| ProbeWarning {
            probe: probe.clone(),
            kind: "probe_pending".to_string(),
            message: format!("probe '{probe}' did not finish ({outcome})"),
        }));

        CompositeResult {
            data: self.data,
            summary: RunSummary {
                outcome,
                applied: self.applied.into_iter().collect(),
                failed: self.failed.into_iter().collect(),
                pending,
                warnings,
                elapsed_ms: elapsed.as_millis() as u64,
            },
        }
    }
}

/// Receives from a queue that may already have been retired.
async fn recv<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
