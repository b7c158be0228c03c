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

use crate::types::v1alpha1::condition::ConditionType;
use strum::Display;

/// The closed set of lifecycle-managed tiers. Used as the key correlating a
/// tier to its condition type and to its per-cycle result in the
/// orchestrator's working map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Component {
    #[strum(serialize = "application")]
    Application,

    #[strum(serialize = "cache")]
    Cache,

    #[strum(serialize = "database")]
    Database,

    #[strum(serialize = "storage")]
    Storage,
}

impl Component {
    pub fn condition_type(&self) -> ConditionType {
        match self {
            Component::Application => ConditionType::ServiceReady,
            Component::Cache => ConditionType::CacheReady,
            Component::Database => ConditionType::DatabaseReady,
            Component::Storage => ConditionType::StorageReady,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_component_maps_to_a_distinct_condition_type() {
        let all = [
            Component::Application,
            Component::Cache,
            Component::Database,
            Component::Storage,
        ];
        for a in &all {
            for b in &all {
                assert_eq!(a == b, a.condition_type() == b.condition_type());
            }
        }
    }
}
