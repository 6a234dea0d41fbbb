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

//! # Pod Store
//!
//! Listing and deletion of candidate pods. The cleanup engine only talks to
//! the cluster through [`PodStore`]; [`KubePodStore`] is the Kubernetes API
//! implementation used by the binary.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams};
use kube::{Client, Error as KubeError, ResourceExt};
use tracing::debug;

use crate::config::ALL_NAMESPACES;
use crate::error::StoreError;

/// Source of candidate pods and sink for deletions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PodStore: Send + Sync {
    /// List pods in `namespace` (empty for all namespaces) matching
    /// `label_selector` (empty for no label filter), in server order.
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, StoreError>;

    /// Delete a single pod.
    async fn delete(&self, pod: &Pod) -> Result<(), StoreError>;
}

/// [`PodStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubePodStore {
    client: Client,
}

impl KubePodStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        if namespace == ALL_NAMESPACES {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

#[async_trait]
impl PodStore for KubePodStore {
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, StoreError> {
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }

        let list = self.api(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn delete(&self, pod: &Pod) -> Result<(), StoreError> {
        let name = pod.name_any();
        let namespace = pod.namespace().unwrap_or_default();

        match self
            .api(&namespace)
            .delete(&name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(KubeError::Api(err)) if err.code == 404 => {
                debug!(pod = %name, namespace = %namespace, "Pod already gone");
                Ok(())
            }
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}
