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

/// Typed client for the object-storage CR managed by the companion minio
/// operator.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "miniocontroller.min.io",
    version = "v1beta1",
    kind = "MinIOInstance",
    namespaced,
    plural = "minioinstances",
    singular = "minioinstance",
    status = "MinIOInstanceStatus",
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct MinIOInstanceSpec {
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,

    /// Secret holding "accesskey"/"secretkey" for the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creds_secret: Option<corev1::LocalObjectReference>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, KubeSchema)]
#[serde(rename_all = "camelCase")]
pub struct MinIOInstanceStatus {
    #[serde(default)]
    pub available_replicas: i32,
}

impl MinIOInstance {
    pub fn is_serving(&self) -> bool {
        let available = self
            .status
            .as_ref()
            .map(|s| s.available_replicas)
            .unwrap_or_default();
        available >= self.spec.replicas
    }
}
