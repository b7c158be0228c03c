// Copyright 2025 The Registry Cluster Operator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

/// One readiness condition per tracked tier. At most one condition of each
/// type exists on a RegistryCluster status.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Hash, JsonSchema, Display)]
pub enum ConditionType {
    ServiceReady,
    CacheReady,
    DatabaseReady,
    StorageReady,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema, Display)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<metav1::Time>,
}

impl Condition {
    pub fn new(type_: ConditionType) -> Self {
        Self {
            type_,
            status: ConditionStatus::Unknown,
            reason: None,
            message: None,
            last_transition_time: None,
        }
    }

    pub fn with_status(mut self, status: ConditionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True when status, reason and message all match. The transition time
    /// is deliberately ignored.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Single authoritative condition upsert, used by every call site that folds
/// a tier result into the cluster status. The existing condition is mutated
/// in place; `last_transition_time` only moves when the observable state
/// actually changed, so re-running on unchanged state is byte-identical.
pub fn upsert(conditions: &mut Vec<Condition>, mut next: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == next.type_) {
        Some(existing) => {
            if existing.same_state(&next) {
                return;
            }
            next.last_transition_time = Some(metav1::Time(Utc::now()));
            *existing = next;
        }
        None => {
            next.last_transition_time = Some(metav1::Time(Utc::now()));
            conditions.push(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(status: ConditionStatus) -> Condition {
        Condition::new(ConditionType::CacheReady)
            .with_status(status)
            .with_reason("CacheReady")
            .with_message("cache is ready")
    }

    #[test]
    fn upsert_appends_new_condition_types() {
        let mut conditions = Vec::new();
        upsert(&mut conditions, ready(ConditionStatus::True));
        upsert(
            &mut conditions,
            Condition::new(ConditionType::DatabaseReady).with_status(ConditionStatus::False),
        );

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].type_, ConditionType::CacheReady);
        assert_eq!(conditions[1].type_, ConditionType::DatabaseReady);
        assert!(conditions[0].last_transition_time.is_some());
    }

    #[test]
    fn upsert_is_idempotent_for_unchanged_state() {
        let mut conditions = Vec::new();
        upsert(&mut conditions, ready(ConditionStatus::True));
        let snapshot = conditions.clone();

        // Same state again: nothing moves, including the transition time.
        upsert(&mut conditions, ready(ConditionStatus::True));
        assert_eq!(conditions, snapshot);
    }

    #[test]
    fn upsert_never_duplicates_a_type() {
        let mut conditions = Vec::new();
        upsert(&mut conditions, ready(ConditionStatus::Unknown));
        upsert(&mut conditions, ready(ConditionStatus::False));
        upsert(&mut conditions, ready(ConditionStatus::True));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::True);
    }

    #[test]
    fn upsert_moves_transition_time_on_state_change() {
        let mut conditions = Vec::new();
        upsert(&mut conditions, ready(ConditionStatus::False));
        let first = conditions[0].last_transition_time.clone();

        let mut changed = ready(ConditionStatus::True);
        changed.last_transition_time = None;
        upsert(&mut conditions, changed);

        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert!(conditions[0].last_transition_time.is_some());
        // A fresh timestamp was assigned rather than keeping the old one.
        assert!(conditions[0].last_transition_time >= first);
    }
}
