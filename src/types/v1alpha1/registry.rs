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

use crate::types::v1alpha1::condition::ConditionStatus;
use kube::{CustomResource, KubeSchema};
use serde::{Deserialize, Serialize};

/// Condition type reported by the registry operator once the application is
/// serving.
pub const READY_CONDITION: &str = "Ready";

/// Typed client for the application-tier CR consumed by the companion
/// registry operator. This controller fills it from the cluster spec and the
/// dependency tiers' properties; it never manages the application pods
/// directly.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "registry.io",
    version = "v1alpha1",
    kind = "Registry",
    namespaced,
    plural = "registries",
    singular = "registry",
    status = "RegistryStatus",
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    pub version: String,

    pub public_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,

    pub components: RegistryComponents,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryComponents {
    pub core: CoreComponent,

    pub portal: PortalComponent,

    pub registry: RegistryComponent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_service: Option<JobServiceComponent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_museum: Option<ChartMuseumComponent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clair: Option<ClairComponent>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDeployment {
    pub replicas: i32,

    pub image: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoreComponent {
    #[serde(flatten)]
    pub deployment: ComponentDeployment,

    pub database_secret: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalComponent {
    #[serde(flatten)]
    pub deployment: ComponentDeployment,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryComponent {
    #[serde(flatten)]
    pub deployment: ComponentDeployment,

    pub storage_secret: String,

    pub cache_secret: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobServiceComponent {
    #[serde(flatten)]
    pub deployment: ComponentDeployment,

    pub cache_secret: String,

    #[serde(default)]
    pub worker_count: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartMuseumComponent {
    #[serde(flatten)]
    pub deployment: ComponentDeployment,

    pub storage_secret: String,

    pub cache_secret: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClairComponent {
    #[serde(flatten)]
    pub deployment: ComponentDeployment,

    pub database_secret: String,

    pub cache_secret: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerability_sources: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, KubeSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RegistryCondition>,
}

impl Registry {
    /// Readiness as reported by the registry operator, mapped onto the
    /// condition-status vocabulary this controller aggregates.
    pub fn ready_status(&self) -> ConditionStatus {
        let reported = self
            .status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == READY_CONDITION));

        match reported.map(|c| c.status.as_str()) {
            Some("True") => ConditionStatus::True,
            Some("False") => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }

    pub fn ready_condition(&self) -> Option<&RegistryCondition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == READY_CONDITION))
    }
}
