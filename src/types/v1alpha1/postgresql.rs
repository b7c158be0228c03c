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

use k8s_openapi::api::core::v1 as corev1;
use kube::{CustomResource, KubeSchema};
use serde::{Deserialize, Serialize};

/// Reported by the database operator once the cluster is serving.
pub const CLUSTER_STATUS_RUNNING: &str = "Running";

/// Typed client for the database cluster CR managed by the companion
/// postgres operator.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "acid.zalan.do",
    version = "v1",
    kind = "Postgresql",
    namespaced,
    plural = "postgresqls",
    singular = "postgresql",
    status = "PostgresqlStatus",
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlSpec {
    pub number_of_instances: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub size: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, KubeSchema)]
pub struct PostgresqlStatus {
    #[serde(
        rename = "PostgresClusterStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub postgres_cluster_status: Option<String>,
}

impl Postgresql {
    pub fn is_running(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.postgres_cluster_status.as_deref())
            == Some(CLUSTER_STATUS_RUNNING)
    }
}
