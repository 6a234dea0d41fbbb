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

//! Cleanup Configuration
//!
//! Rule model for pod cleanup: global settings (dry-run, batch size) plus an
//! ordered list of rules. Configuration is loaded from YAML, validated, and
//! shared with the scheduler through [`SharedConfig`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{ConfigError, PodCleanupError, RuleError, RuleFailure, ValidationError};

/// Batch size used when the configuration leaves it unset or zero
pub const DEFAULT_BATCH_SIZE: i64 = 10;

/// Namespace entry meaning "every namespace"
pub const ALL_NAMESPACES: &str = "";

/// Root cleanup configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanupConfiguration {
    /// Simulate deletions instead of performing them
    pub dry_run: bool,

    /// Pods deleted per batch; zero or unset resolves to [`DEFAULT_BATCH_SIZE`]
    pub batch_size: i64,

    /// Pod cleanup rules
    pub pod_cleanup_config: PodCleanupConfig,
}

/// Pod cleanup block
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PodCleanupConfig {
    /// Master switch; when false no rule is evaluated
    pub enabled: bool,

    /// Rules in evaluation order
    pub rules: Vec<CleanupRule>,
}

/// Label selection criteria (equality only, ANDed)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

/// A single named cleanup rule
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupRule {
    pub name: String,

    pub enabled: bool,

    pub selector: LabelSelector,

    /// Exact pod phase to match ("Succeeded", "Failed", ...); empty matches any phase
    pub phase: String,

    /// Minimum pod age before it becomes eligible
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Target namespaces; empty means all namespaces
    pub namespaces: Vec<String>,
}

impl CleanupConfiguration {
    /// Resolve an unset or zero batch size to the default.
    pub fn set_defaults(&mut self) {
        if self.batch_size <= 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
    }

    /// Reject a negative batch size, then validate the pod cleanup block.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size < 0 {
            return Err(ValidationError::InvalidBatchSize(self.batch_size));
        }

        self.pod_cleanup_config.validate()?;
        Ok(())
    }

    /// Batch size as used by the deletion engine. Zero means one batch.
    pub fn effective_batch_size(&self) -> usize {
        usize::try_from(self.batch_size).unwrap_or(0)
    }

    /// Rules that will be evaluated on the next run
    pub fn active_rules(&self) -> impl Iterator<Item = &CleanupRule> {
        self.pod_cleanup_config
            .rules
            .iter()
            .filter(move |rule| self.pod_cleanup_config.enabled && rule.enabled)
    }
}

impl PodCleanupConfig {
    /// Validate every rule and aggregate all failures.
    ///
    /// A disabled block is vacuously valid, even if its rules are malformed.
    pub fn validate(&self) -> Result<(), PodCleanupError> {
        if !self.enabled {
            return Ok(());
        }

        let failures: Vec<RuleFailure> = self
            .rules
            .iter()
            .enumerate()
            .filter_map(|(idx, rule)| {
                rule.validate().err().map(|error| RuleFailure {
                    position: idx + 1,
                    name: rule.name.clone(),
                    error,
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PodCleanupError { failures })
        }
    }
}

impl CleanupRule {
    /// Checks name, then ttl, then filter presence. Disabled rules always pass.
    pub fn validate(&self) -> Result<(), RuleError> {
        if !self.enabled {
            return Ok(());
        }

        if self.name.is_empty() {
            return Err(RuleError::MissingName);
        }

        if self.ttl.is_zero() {
            return Err(RuleError::NonPositiveTtl);
        }

        if self.phase.is_empty() && self.selector.match_labels.is_empty() {
            return Err(RuleError::MissingFilter);
        }

        Ok(())
    }

    /// Namespaces to scan, with an empty list expanded to the all-namespaces wildcard.
    pub fn target_namespaces(&self) -> Vec<&str> {
        if self.namespaces.is_empty() {
            vec![ALL_NAMESPACES]
        } else {
            self.namespaces.iter().map(String::as_str).collect()
        }
    }
}

/// Parse, validate and default a configuration from YAML bytes.
///
/// Validation runs before defaulting so a negative batch size is rejected
/// rather than silently replaced; an absent batch size still resolves to 10.
pub fn load_config(data: &[u8]) -> Result<CleanupConfiguration, ConfigError> {
    let mut config: CleanupConfiguration = serde_yaml::from_slice(data)?;
    config.validate()?;
    config.set_defaults();
    Ok(config)
}

/// Read and load a configuration file.
pub fn load_config_from_file(path: impl AsRef<Path>) -> Result<CleanupConfiguration, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| ConfigError::UnreadableFile {
        path: path.to_path_buf(),
        source,
    })?;

    load_config(&data)
}

/// Async counterpart of [`load_config_from_file`] for use on the runtime.
pub async fn read_config_file(path: impl AsRef<Path>) -> Result<CleanupConfiguration, ConfigError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| ConfigError::UnreadableFile {
            path: path.to_path_buf(),
            source,
        })?;

    load_config(&data)
}

/// Live configuration shared between the watcher (writer) and the scheduler (reader).
///
/// Readers take an immutable snapshot; the writer swaps the whole value.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<CleanupConfiguration>>>,
}

impl SharedConfig {
    pub fn new(config: CleanupConfiguration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current configuration snapshot
    pub async fn snapshot(&self) -> Arc<CleanupConfiguration> {
        self.inner.read().await.clone()
    }

    /// Replace the live configuration wholesale.
    pub async fn replace(&self, config: CleanupConfiguration) {
        *self.inner.write().await = Arc::new(config);
    }
}
