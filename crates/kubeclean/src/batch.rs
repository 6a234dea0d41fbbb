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

//! # Batch Deletion
//!
//! Deletes matched pods in fixed-size batches with a short pause between
//! batches. Per-pod failures are recorded and never stop the run.

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::store::PodStore;

/// Pause between consecutive batches
pub const BATCH_PAUSE: Duration = Duration::from_millis(100);

/// Namespaced pod identity used in reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl From<&Pod> for PodRef {
    fn from(pod: &Pod) -> Self {
        Self {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
        }
    }
}

/// A pod whose deletion failed
#[derive(Debug, Clone)]
pub struct FailedDeletion {
    pub pod: PodRef,
    pub reason: String,
}

/// Results of a batched deletion
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Number of batches started
    pub batches: usize,
    /// Pods deleted
    pub deleted: Vec<PodRef>,
    /// Pods that would have been deleted (dry-run)
    pub would_delete: Vec<PodRef>,
    /// Pods whose deletion failed
    pub failed: Vec<FailedDeletion>,
    /// Set when cancellation stopped the run before every batch ran
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Pods handled without error, real or simulated
    pub fn processed(&self) -> usize {
        self.deleted.len() + self.would_delete.len()
    }
}

/// Split `len` items into `(start, end)` ranges of `batch_size`.
///
/// A zero batch size yields a single range covering everything.
pub fn batch_ranges(len: usize, batch_size: usize) -> Vec<(usize, usize)> {
    if len == 0 {
        return Vec::new();
    }

    let size = if batch_size == 0 { len } else { batch_size };
    (0..len)
        .step_by(size)
        .map(|start| (start, (start + size).min(len)))
        .collect()
}

/// Delete `pods` in batches of `batch_size`, or only log them under `dry_run`.
///
/// Cancellation is checked before each batch and during the pause; an
/// in-flight delete call is always allowed to finish.
pub async fn delete_in_batches(
    store: &dyn PodStore,
    pods: &[Pod],
    batch_size: usize,
    dry_run: bool,
    cancel: &CancellationToken,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let ranges = batch_ranges(pods.len(), batch_size);
    let last = ranges.len().saturating_sub(1);

    for (idx, &(start, end)) in ranges.iter().enumerate() {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        outcome.batches += 1;
        info!(
            range = %format!("{}-{}", start + 1, end),
            total = pods.len(),
            "Processing batch"
        );

        for pod in &pods[start..end] {
            let pod_ref = PodRef::from(pod);

            if dry_run {
                info!(pod = %pod_ref.name, namespace = %pod_ref.namespace, "DRY RUN: Would delete pod");
                outcome.would_delete.push(pod_ref);
                continue;
            }

            info!(pod = %pod_ref.name, namespace = %pod_ref.namespace, "Deleting pod");
            match store.delete(pod).await {
                Ok(()) => outcome.deleted.push(pod_ref),
                Err(e) => {
                    error!(
                        pod = %pod_ref.name,
                        namespace = %pod_ref.namespace,
                        error = %e,
                        "Failed to delete pod"
                    );
                    outcome.failed.push(FailedDeletion {
                        pod: pod_ref,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if idx < last {
            tokio::select! {
                () = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                () = tokio::time::sleep(BATCH_PAUSE) => {}
            }
        }
    }

    outcome
}
