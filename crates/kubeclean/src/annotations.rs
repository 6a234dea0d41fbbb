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

//! Per-pod cleanup overrides (annotations)

use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Annotation that opts a pod out of cleanup when set to "true"
pub const ANNOTATION_DISABLED: &str = "kubeclean/disabled";
/// Annotation overriding the rule TTL for an individual pod (e.g. "30m")
pub const ANNOTATION_TTL: &str = "kubeclean/ttl";

fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Returns true if the pod is explicitly excluded from cleanup.
#[must_use]
pub fn is_cleanup_disabled(meta: &ObjectMeta) -> bool {
    annotation(meta, ANNOTATION_DISABLED) == Some("true")
}

/// Raw TTL override, parsed. `None` when the annotation is absent.
pub fn ttl_override(meta: &ObjectMeta) -> Option<Result<Duration, humantime::DurationError>> {
    annotation(meta, ANNOTATION_TTL).map(|raw| humantime::parse_duration(raw.trim()))
}
