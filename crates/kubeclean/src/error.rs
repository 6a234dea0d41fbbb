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

//! Error types for configuration loading, rule evaluation and pod store access.

use std::path::PathBuf;

use kube::Error as KubeError;
use thiserror::Error;

/// A single enabled rule that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule name must be provided")]
    MissingName,

    #[error("ttl must be greater than zero")]
    NonPositiveTtl,

    #[error("either 'phase' or 'selector.matchLabels' must be specified")]
    MissingFilter,
}

/// A failing rule together with its 1-based position in the rule list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rule {position} ({name}): {error}")]
pub struct RuleFailure {
    pub position: usize,
    pub name: String,
    pub error: RuleError,
}

/// Every failing rule of a pod cleanup block, in configuration order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("pod cleanup config validation errors:{}", render_failures(.failures))]
pub struct PodCleanupError {
    pub failures: Vec<RuleFailure>,
}

fn render_failures(failures: &[RuleFailure]) -> String {
    failures.iter().map(|failure| format!("\n{failure}")).collect()
}

/// Structural problems with a parsed cleanup configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("batch size cannot be negative (got {0})")]
    InvalidBatchSize(i64),

    #[error("pod cleanup config error: {0}")]
    PodCleanup(#[from] PodCleanupError),
}

/// Errors raised while loading a cleanup configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse cleanup config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),

    #[error("unable to read config file {path:?}: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A `matchLabels` entry that cannot be turned into a label selector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid label key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid value '{value}' for label '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Errors scoped to a single rule during a cleanup run
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("invalid label selector for rule '{rule}': {source}")]
    InvalidSelector {
        rule: String,
        #[source]
        source: SelectorError,
    },
}

/// Errors returned by a [`PodStore`](crate::store::PodStore)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] KubeError),

    #[error("pod store unavailable: {0}")]
    Unavailable(String),
}
