/*
 * KubeClean - Rule-driven pod cleanup for Kubernetes
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! # Pod Cleanup Controller
//!
//! Runs every enabled rule through the matcher and the batch deletion engine,
//! and drives those runs on a fixed interval until shutdown.
//!
//! Runs are awaited inline, so two runs never overlap. Each run is bounded by
//! a timeout so a stuck API call cannot hold up later ticks forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::{delete_in_batches, BatchOutcome};
use crate::config::SharedConfig;
use crate::matcher::PodMatcher;
use crate::store::PodStore;

/// Upper bound on a single cleanup run
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Result of evaluating one rule
#[derive(Debug, Clone, Default)]
pub struct RuleReport {
    pub rule: String,
    /// Pods selected by the matcher
    pub matched: usize,
    /// Deletion results; `None` when nothing was matched or the rule failed
    pub outcome: Option<BatchOutcome>,
    /// Rule-level error (e.g. invalid selector)
    pub error: Option<String>,
}

impl RuleReport {
    fn new(rule: &str) -> Self {
        Self {
            rule: rule.to_string(),
            ..Default::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.error.is_some() || self.outcome.as_ref().is_some_and(BatchOutcome::has_failures)
    }
}

/// Result of one cleanup run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// False when pod cleanup was disabled at the start of the run
    pub enabled: bool,
    pub dry_run: bool,
    pub rules: Vec<RuleReport>,
    /// Set when shutdown interrupted the run
    pub cancelled: bool,
}

impl RunReport {
    pub fn rule(&self, name: &str) -> Option<&RuleReport> {
        self.rules.iter().find(|report| report.rule == name)
    }
}

/// Pod cleanup controller
pub struct PodCleanController {
    store: Arc<dyn PodStore>,
    config: SharedConfig,
    matcher: PodMatcher,
    force_dry_run: bool,
}

impl PodCleanController {
    #[must_use]
    pub fn new(store: Arc<dyn PodStore>, config: SharedConfig) -> Self {
        Self {
            matcher: PodMatcher::new(store.clone()),
            store,
            config,
            force_dry_run: false,
        }
    }

    /// Simulate all deletions regardless of the configured `dryRun`.
    #[must_use]
    pub fn with_forced_dry_run(mut self, force: bool) -> Self {
        self.force_dry_run = force;
        self
    }

    /// Run every enabled rule once against the current configuration snapshot.
    ///
    /// Rule failures are logged and recorded; they never abort the run.
    pub async fn run_cleanup(&self, cancel: &CancellationToken) -> RunReport {
        let config = self.config.snapshot().await;
        let dry_run = config.dry_run || self.force_dry_run;
        let mut report = RunReport {
            enabled: config.pod_cleanup_config.enabled,
            dry_run,
            ..Default::default()
        };

        if !report.enabled {
            debug!("Pod cleanup disabled; skipping run");
            return report;
        }

        info!(dry_run, "Starting pod cleanup");

        for rule in config.active_rules() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            info!(rule = %rule.name, "Processing cleanup rule");
            let mut rule_report = RuleReport::new(&rule.name);

            let pods = match self.matcher.find_pods_to_cleanup(rule).await {
                Ok(pods) => pods,
                Err(e) => {
                    error!(rule = %rule.name, error = %e, "Failed to find pods");
                    rule_report.error = Some(e.to_string());
                    report.rules.push(rule_report);
                    continue;
                }
            };

            rule_report.matched = pods.len();
            if pods.is_empty() {
                debug!(rule = %rule.name, "No pods to cleanup for rule");
                report.rules.push(rule_report);
                continue;
            }

            info!(rule = %rule.name, count = pods.len(), "Found pods to cleanup");

            let outcome = delete_in_batches(
                self.store.as_ref(),
                &pods,
                config.effective_batch_size(),
                dry_run,
                cancel,
            )
            .await;

            if outcome.has_failures() {
                error!(
                    rule = %rule.name,
                    failed = outcome.failed.len(),
                    "Failed to delete some pods"
                );
            }
            info!(
                rule = %rule.name,
                processed = outcome.processed(),
                "Completed cleanup for rule"
            );

            report.cancelled |= outcome.cancelled;
            rule_report.outcome = Some(outcome);
            report.rules.push(rule_report);

            if report.cancelled {
                break;
            }
        }

        info!(rules = report.rules.len(), "Pod cleanup completed");
        report
    }

    /// Run cleanup every `interval` until `shutdown` fires.
    ///
    /// The first run happens one interval after start.
    #[instrument(skip(self, shutdown))]
    pub async fn run_periodic(
        &self,
        interval: Duration,
        run_timeout: Duration,
        shutdown: CancellationToken,
    ) {
        // tokio intervals reject a zero period
        let interval = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Pod cleanup scheduler started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let run_token = shutdown.child_token();
                    let run = tokio::time::timeout(run_timeout, self.run_cleanup(&run_token));

                    // Store calls do not observe the token, so shutdown must
                    // also be able to drop a run that is stuck inside one.
                    tokio::select! {
                        () = shutdown.cancelled() => {
                            run_token.cancel();
                            info!("Shutdown requested during cleanup run; abandoning run");
                            break;
                        }
                        result = run => match result {
                            Ok(report) => debug!(
                                rules = report.rules.len(),
                                cancelled = report.cancelled,
                                "Cleanup run finished"
                            ),
                            Err(_) => {
                                run_token.cancel();
                                warn!(timeout = ?run_timeout, "Cleanup run exceeded timeout and was abandoned");
                            }
                        },
                    }
                }
            }
        }

        info!("Pod cleanup scheduler stopped");
    }
}
