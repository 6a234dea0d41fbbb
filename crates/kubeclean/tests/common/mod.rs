//! Shared fixtures: an in-memory pod store and pod builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use kubeclean::{PodStore, StoreError};

/// In-memory [`PodStore`] with optional failure injection
#[derive(Default)]
pub struct FakePodStore {
    pods: Mutex<Vec<Pod>>,
    deleted: Mutex<Vec<String>>,
    fail_delete: HashSet<String>,
    fail_list: HashSet<String>,
}

impl FakePodStore {
    pub fn new(pods: Vec<Pod>) -> Self {
        Self {
            pods: Mutex::new(pods),
            ..Default::default()
        }
    }

    /// Deleting this pod name returns an error.
    pub fn failing_delete(mut self, name: &str) -> Self {
        self.fail_delete.insert(name.to_string());
        self
    }

    /// Listing this namespace returns an error.
    pub fn failing_list(mut self, namespace: &str) -> Self {
        self.fail_list.insert(namespace.to_string());
        self
    }

    pub fn remaining(&self) -> Vec<String> {
        self.pods.lock().unwrap().iter().map(ResourceExt::name_any).collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    if selector.is_empty() {
        return true;
    }
    let labels = pod.labels();
    selector.split(',').all(|term| {
        let (key, value) = term.split_once('=').unwrap_or((term, ""));
        labels.get(key).map(String::as_str) == Some(value)
    })
}

#[async_trait]
impl PodStore for FakePodStore {
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, StoreError> {
        if self.fail_list.contains(namespace) {
            return Err(StoreError::Unavailable(format!("cannot list {namespace}")));
        }

        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|pod| namespace.is_empty() || pod.namespace().as_deref() == Some(namespace))
            .filter(|pod| matches_selector(pod, label_selector))
            .cloned()
            .collect())
    }

    async fn delete(&self, pod: &Pod) -> Result<(), StoreError> {
        let name = pod.name_any();
        if self.fail_delete.contains(&name) {
            return Err(StoreError::Unavailable(format!("delete of {name} rejected")));
        }

        self.pods.lock().unwrap().retain(|p| {
            !(p.name_any() == name && p.namespace() == pod.namespace())
        });
        self.deleted.lock().unwrap().push(name);
        Ok(())
    }
}

/// Pod builder for test fixtures
pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            pod: Pod {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some("default".to_string()),
                    creation_timestamp: Some(Time(Utc::now())),
                    ..Default::default()
                },
                status: Some(PodStatus {
                    phase: Some("Succeeded".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.pod.metadata.namespace = Some(namespace.to_string());
        self
    }

    pub fn phase(mut self, phase: &str) -> Self {
        if let Some(status) = self.pod.status.as_mut() {
            status.phase = Some(phase.to_string());
        }
        self
    }

    pub fn age(mut self, age: Duration) -> Self {
        self.pod.metadata.creation_timestamp = Some(Time(Utc::now() - age));
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.pod
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.pod
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Pod {
        self.pod
    }
}
