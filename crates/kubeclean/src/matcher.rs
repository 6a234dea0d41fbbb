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

//! # Pod Matcher
//!
//! Selects the pods a rule applies to: lists each target namespace through the
//! [`PodStore`] with the rule's label selector, then filters by phase, the
//! disable annotation and age against the effective TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, warn};

use crate::annotations::{is_cleanup_disabled, ttl_override};
use crate::config::{CleanupRule, LabelSelector};
use crate::error::{CleanupError, SelectorError};
use crate::store::PodStore;

const MAX_LABEL_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

lazy_static! {
    /// Label name or value: alphanumeric at both ends, `-_.` allowed inside
    static ref LABEL_TOKEN: Regex =
        Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap();

    /// DNS-1123 subdomain used as an optional label key prefix
    static ref DNS_SUBDOMAIN: Regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap();
}

fn validate_label_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason: &str| SelectorError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !DNS_SUBDOMAIN.is_match(prefix) {
            return Err(invalid("prefix must be a DNS subdomain of at most 253 characters"));
        }
    }

    if name.is_empty() || name.len() > MAX_LABEL_NAME_LEN || !LABEL_TOKEN.is_match(name) {
        return Err(invalid(
            "name must be 1-63 alphanumeric characters, '-', '_' or '.', starting and ending alphanumeric",
        ));
    }

    Ok(())
}

fn validate_label_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() {
        return Ok(());
    }

    if value.len() > MAX_LABEL_NAME_LEN || !LABEL_TOKEN.is_match(value) {
        return Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be at most 63 alphanumeric characters, '-', '_' or '.', starting and ending alphanumeric"
                .to_string(),
        });
    }

    Ok(())
}

/// Render `matchLabels` as an equality selector (`k1=v1,k2=v2`, key order).
///
/// An empty map yields an empty selector, which matches every pod.
pub fn label_selector(selector: &LabelSelector) -> Result<String, SelectorError> {
    let mut terms = Vec::with_capacity(selector.match_labels.len());
    for (key, value) in &selector.match_labels {
        validate_label_key(key)?;
        validate_label_value(key, value)?;
        terms.push(format!("{key}={value}"));
    }
    Ok(terms.join(","))
}

/// TTL that applies to `pod`: a parsable annotation override wins over the rule TTL.
pub fn effective_ttl(pod: &Pod, rule: &CleanupRule) -> Duration {
    match ttl_override(&pod.metadata) {
        Some(Ok(ttl)) => ttl,
        Some(Err(e)) => {
            warn!(
                pod = %pod.name_any(),
                namespace = %pod.namespace().unwrap_or_default(),
                rule = %rule.name,
                error = %e,
                "Invalid TTL annotation; using rule TTL"
            );
            rule.ttl
        }
        None => rule.ttl,
    }
}

/// Whether `pod` has outlived `ttl` at `now`. Exactly-at-TTL is not expired.
fn is_expired(pod: &Pod, ttl: Duration, now: DateTime<Utc>) -> bool {
    let Some(created) = pod.metadata.creation_timestamp.as_ref() else {
        return false;
    };
    let Ok(ttl) = TimeDelta::from_std(ttl) else {
        return false;
    };

    now.signed_duration_since(created.0) > ttl
}

/// Eligibility of a single pod under `rule` at `now`.
pub fn should_cleanup_pod(pod: &Pod, rule: &CleanupRule, now: DateTime<Utc>) -> bool {
    if !rule.phase.is_empty() {
        let phase = pod
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            .unwrap_or_default();
        if phase != rule.phase {
            return false;
        }
    }

    if is_cleanup_disabled(&pod.metadata) {
        return false;
    }

    is_expired(pod, effective_ttl(pod, rule), now)
}

/// Finds pods eligible for cleanup under a rule
#[derive(Clone)]
pub struct PodMatcher {
    store: Arc<dyn PodStore>,
}

impl PodMatcher {
    #[must_use]
    pub fn new(store: Arc<dyn PodStore>) -> Self {
        Self { store }
    }

    /// Eligible pods for `rule`, evaluated against the current time.
    pub async fn find_pods_to_cleanup(&self, rule: &CleanupRule) -> Result<Vec<Pod>, CleanupError> {
        self.find_pods_to_cleanup_at(rule, Utc::now()).await
    }

    /// Eligible pods for `rule` at `now`, in namespace order then listing order.
    ///
    /// Disabled rules select nothing. A listing failure skips only that namespace.
    pub async fn find_pods_to_cleanup_at(
        &self,
        rule: &CleanupRule,
        now: DateTime<Utc>,
    ) -> Result<Vec<Pod>, CleanupError> {
        if !rule.enabled {
            return Ok(Vec::new());
        }

        let selector =
            label_selector(&rule.selector).map_err(|source| CleanupError::InvalidSelector {
                rule: rule.name.clone(),
                source,
            })?;

        let mut matched = Vec::new();
        for namespace in rule.target_namespaces() {
            let pods = match self.store.list(namespace, &selector).await {
                Ok(pods) => pods,
                Err(e) => {
                    error!(
                        rule = %rule.name,
                        namespace = %namespace,
                        error = %e,
                        "Failed to list pods"
                    );
                    continue;
                }
            };

            debug!(
                rule = %rule.name,
                namespace = %namespace,
                listed = pods.len(),
                "Evaluating candidate pods"
            );

            matched.extend(
                pods.into_iter()
                    .filter(|pod| should_cleanup_pod(pod, rule, now)),
            );
        }

        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{ANNOTATION_DISABLED, ANNOTATION_TTL};
    use crate::error::StoreError;
    use crate::store::MockPodStore;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn pod(name: &str, phase: &str, age: Duration) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                creation_timestamp: Some(Time(now() - TimeDelta::from_std(age).unwrap())),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn annotate(mut pod: Pod, key: &str, value: &str) -> Pod {
        pod.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        pod
    }

    fn rule() -> CleanupRule {
        CleanupRule {
            name: "succeeded".to_string(),
            enabled: true,
            phase: "Succeeded".to_string(),
            ttl: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn selector_renders_sorted_equality_terms() {
        let mut selector = LabelSelector::default();
        assert_eq!(label_selector(&selector).unwrap(), "");

        selector
            .match_labels
            .insert("tier".to_string(), "batch".to_string());
        selector
            .match_labels
            .insert("app.kubernetes.io/name".to_string(), "worker".to_string());
        assert_eq!(
            label_selector(&selector).unwrap(),
            "app.kubernetes.io/name=worker,tier=batch"
        );
    }

    #[test]
    fn selector_rejects_malformed_keys_and_values() {
        let mut selector = LabelSelector::default();
        selector
            .match_labels
            .insert("bad key!".to_string(), "x".to_string());
        assert!(matches!(
            label_selector(&selector),
            Err(SelectorError::InvalidKey { .. })
        ));

        let mut selector = LabelSelector::default();
        selector
            .match_labels
            .insert("Example.com/app".to_string(), "x".to_string());
        assert!(matches!(
            label_selector(&selector),
            Err(SelectorError::InvalidKey { .. })
        ));

        let mut selector = LabelSelector::default();
        selector
            .match_labels
            .insert("app".to_string(), "-leading-dash".to_string());
        assert!(matches!(
            label_selector(&selector),
            Err(SelectorError::InvalidValue { .. })
        ));

        let mut selector = LabelSelector::default();
        selector
            .match_labels
            .insert("app".to_string(), "a".repeat(64));
        assert!(label_selector(&selector).is_err());
    }

    #[test]
    fn selector_accepts_empty_value() {
        let mut selector = LabelSelector::default();
        selector.match_labels.insert("flag".to_string(), String::new());
        assert_eq!(label_selector(&selector).unwrap(), "flag=");
    }

    #[test]
    fn phase_must_match_exactly() {
        let r = rule();
        assert!(should_cleanup_pod(&pod("a", "Succeeded", 2 * HOUR), &r, now()));
        assert!(!should_cleanup_pod(&pod("b", "Failed", 2 * HOUR), &r, now()));
        assert!(!should_cleanup_pod(&pod("c", "succeeded", 2 * HOUR), &r, now()));
    }

    #[test]
    fn empty_phase_matches_any_phase() {
        let mut r = rule();
        r.phase = String::new();
        assert!(should_cleanup_pod(&pod("a", "Failed", 2 * HOUR), &r, now()));
        assert!(should_cleanup_pod(&pod("b", "Running", 2 * HOUR), &r, now()));
    }

    #[test]
    fn age_exactly_at_ttl_is_not_eligible() {
        let r = rule();
        assert!(!should_cleanup_pod(&pod("edge", "Succeeded", HOUR), &r, now()));
        assert!(should_cleanup_pod(
            &pod("past", "Succeeded", HOUR + Duration::from_secs(1)),
            &r,
            now()
        ));
        assert!(!should_cleanup_pod(&pod("young", "Succeeded", HOUR / 2), &r, now()));
    }

    #[test]
    fn eligibility_is_monotonic_in_age() {
        let r = rule();
        let ages = [30u64, 59, 60, 61, 120, 600];
        let eligible: Vec<bool> = ages
            .iter()
            .map(|m| should_cleanup_pod(&pod("p", "Succeeded", Duration::from_secs(m * 60)), &r, now()))
            .collect();
        let first = eligible.iter().position(|e| *e).unwrap();
        assert!(eligible[first..].iter().all(|e| *e));
        assert!(eligible[..first].iter().all(|e| !*e));
    }

    #[test]
    fn missing_creation_timestamp_is_never_eligible() {
        let mut p = pod("p", "Succeeded", 2 * HOUR);
        p.metadata.creation_timestamp = None;
        assert!(!should_cleanup_pod(&p, &rule(), now()));
    }

    #[test]
    fn disabled_annotation_wins() {
        let p = annotate(pod("keep", "Succeeded", 10 * HOUR), ANNOTATION_DISABLED, "true");
        assert!(!should_cleanup_pod(&p, &rule(), now()));

        let p = annotate(pod("other", "Succeeded", 10 * HOUR), ANNOTATION_DISABLED, "false");
        assert!(should_cleanup_pod(&p, &rule(), now()));
    }

    #[test]
    fn ttl_annotation_overrides_rule_ttl() {
        // Longer override keeps an otherwise-expired pod
        let p = annotate(pod("long", "Succeeded", 2 * HOUR), ANNOTATION_TTL, "3h");
        assert!(!should_cleanup_pod(&p, &rule(), now()));

        // Shorter override expires a young pod
        let p = annotate(pod("short", "Succeeded", HOUR / 2), ANNOTATION_TTL, "10m");
        assert!(should_cleanup_pod(&p, &rule(), now()));
    }

    #[test]
    fn unparsable_ttl_annotation_falls_back_to_rule() {
        let p = annotate(pod("old", "Succeeded", 2 * HOUR), ANNOTATION_TTL, "eventually");
        assert!(should_cleanup_pod(&p, &rule(), now()));

        let p = annotate(pod("new", "Succeeded", HOUR / 2), ANNOTATION_TTL, "eventually");
        assert!(!should_cleanup_pod(&p, &rule(), now()));
    }

    #[tokio::test]
    async fn disabled_rule_selects_nothing_without_listing() {
        let mut store = MockPodStore::new();
        store.expect_list().never();

        let matcher = PodMatcher::new(Arc::new(store));
        let mut r = rule();
        r.enabled = false;
        assert!(matcher.find_pods_to_cleanup_at(&r, now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_selector_aborts_rule() {
        let mut store = MockPodStore::new();
        store.expect_list().never();

        let matcher = PodMatcher::new(Arc::new(store));
        let mut r = rule();
        r.selector
            .match_labels
            .insert("not valid/".to_string(), "x".to_string());

        let err = matcher.find_pods_to_cleanup_at(&r, now()).await.unwrap_err();
        assert!(matches!(err, CleanupError::InvalidSelector { rule: ref name, .. } if name == "succeeded"));
    }

    #[tokio::test]
    async fn listing_failure_skips_only_that_namespace() {
        let mut store = MockPodStore::new();
        store
            .expect_list()
            .withf(|namespace, selector| namespace == "broken" && selector == "app=test")
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("connection reset".to_string())));
        store
            .expect_list()
            .withf(|namespace, selector| namespace == "jobs" && selector == "app=test")
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    pod("old-1", "Succeeded", 2 * HOUR),
                    pod("fresh", "Succeeded", HOUR / 4),
                    pod("old-2", "Succeeded", 3 * HOUR),
                ])
            });

        let matcher = PodMatcher::new(Arc::new(store));
        let mut r = rule();
        r.namespaces = vec!["broken".to_string(), "jobs".to_string()];
        r.selector
            .match_labels
            .insert("app".to_string(), "test".to_string());

        let names: Vec<String> = matcher
            .find_pods_to_cleanup_at(&r, now())
            .await
            .unwrap()
            .iter()
            .map(ResourceExt::name_any)
            .collect();
        assert_eq!(names, vec!["old-1", "old-2"]);
    }

    #[tokio::test]
    async fn empty_namespace_list_queries_all_namespaces() {
        let mut store = MockPodStore::new();
        store
            .expect_list()
            .withf(|namespace, selector| namespace.is_empty() && selector.is_empty())
            .times(1)
            .returning(|_, _| Ok(vec![pod("p", "Succeeded", 2 * HOUR)]));

        let matcher = PodMatcher::new(Arc::new(store));
        let matched = matcher.find_pods_to_cleanup_at(&rule(), now()).await.unwrap();
        assert_eq!(matched.len(), 1);
    }
}
