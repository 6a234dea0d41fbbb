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

//! KubeClean core library
//!
//! Periodically deletes pods that match operator-defined cleanup rules
//! (phase, age, namespace and labels), in bounded batches, with dry-run
//! support and live configuration reload.

pub mod annotations;
pub mod batch;
pub mod config;
pub mod controller;
pub mod error;
pub mod matcher;
pub mod probe;
pub mod store;
pub mod watcher;

// Re-export commonly used types
pub use config::{
    load_config, load_config_from_file, read_config_file, CleanupConfiguration, CleanupRule,
    LabelSelector, PodCleanupConfig, SharedConfig,
};
pub use controller::{PodCleanController, RuleReport, RunReport};
pub use error::{CleanupError, ConfigError, StoreError, ValidationError};
pub use matcher::PodMatcher;
pub use store::{KubePodStore, PodStore};
pub use watcher::ConfigWatcher;
