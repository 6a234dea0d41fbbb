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

//! # Config Watcher
//!
//! Polls the configuration file's modification time and swaps the live
//! configuration when it changes and still validates. A failed reload keeps
//! the previous configuration and is retried on every tick until the file is
//! fixed, because the tracked modification time only advances on success.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::{read_config_file, SharedConfig};

/// Result of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Modification time has not advanced
    Unchanged,
    /// New configuration loaded and published
    Reloaded,
    /// The file could not be stat'ed; treated as no change
    StatFailed,
    /// The file changed but could not be loaded; previous configuration kept
    ReloadFailed,
}

/// Hot-reloads a [`SharedConfig`] from a file
pub struct ConfigWatcher {
    path: PathBuf,
    shared: SharedConfig,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Create a watcher, taking the file's current modification time as the baseline.
    pub fn new(path: impl Into<PathBuf>, shared: SharedConfig) -> Self {
        let path = path.into();
        let last_modified = std::fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok();

        Self {
            path,
            shared,
            last_modified,
        }
    }

    /// Check the file once and reload it if it changed.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let modified = match tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to stat config file");
                return PollOutcome::StatFailed;
            }
        };

        if self.last_modified.is_some_and(|last| modified <= last) {
            return PollOutcome::Unchanged;
        }

        info!(path = %self.path.display(), "Configuration file changed, reloading...");

        match read_config_file(&self.path).await {
            Ok(config) => {
                self.shared.replace(config).await;
                self.last_modified = Some(modified);
                info!(path = %self.path.display(), "Configuration reloaded successfully");
                PollOutcome::Reloaded
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to reload config file");
                PollOutcome::ReloadFailed
            }
        }
    }

    /// Poll every `poll_interval` until `shutdown` fires.
    #[instrument(skip(self, shutdown), fields(path = %self.path.display()))]
    pub async fn run(mut self, poll_interval: Duration, shutdown: CancellationToken) {
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Config watcher started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.poll_once().await;
                    debug!(?outcome, "Config poll finished");
                }
            }
        }

        info!("Config watcher stopped");
    }
}
