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

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

/// The user-declared desired state for a whole registry deployment: the
/// application tier plus its cache, database and object-storage tiers.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "registry.io",
    version = "v1alpha1",
    kind = "RegistryCluster",
    namespaced,
    status = "crate::types::v1alpha1::status::RegistryClusterStatus",
    shortname = "rc",
    plural = "registryclusters",
    singular = "registrycluster",
    printcolumn = r#"{"name":"Service", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ServiceReady\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct RegistryClusterSpec {
    /// Registry application version; must be one the operator knows images for.
    pub version: String,

    pub public_url: String,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_source: Option<ImageSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password_secret: Option<String>,

    pub cache: CacheSpec,

    pub database: DatabaseSpec,

    pub storage: StorageSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_service: Option<JobServiceSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_museum: Option<ChartMuseumSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clair: Option<ClairSpec>,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
    /// Private registry prefix for all component images.
    pub registry: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum TierKind {
    #[default]
    #[serde(rename = "inCluster")]
    InCluster,

    #[serde(rename = "external")]
    External,
}

/// Sizing for an in-cluster tier deployment.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostPort {
    pub host: String,
    pub port: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpec {
    #[serde(default)]
    pub kind: TierKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSpec>,

    /// External connection schema, "sentinel" or "redis".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostPort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,

    /// Secret holding the external password under the "password" key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    #[serde(default)]
    pub kind: TierKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSpec>,

    /// Secret holding the external connection info (host, port, username,
    /// password).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum StorageKind {
    #[default]
    #[serde(rename = "inCluster")]
    InCluster,

    #[serde(rename = "s3")]
    S3,

    #[serde(rename = "azure")]
    Azure,

    #[serde(rename = "gcs")]
    Gcs,

    #[serde(rename = "swift")]
    Swift,

    #[serde(rename = "oss")]
    Oss,
}

impl StorageKind {
    /// Name of the property under which this storage flavor exposes its
    /// credential secret to the application tier.
    pub fn property_name(&self) -> &'static str {
        match self {
            StorageKind::InCluster => "registrySecret",
            StorageKind::S3 => "s3Secret",
            StorageKind::Azure => "azureSecret",
            StorageKind::Gcs => "gcsSecret",
            StorageKind::Swift => "swiftSecret",
            StorageKind::Oss => "ossSecret",
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, StorageKind::InCluster)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    #[serde(default)]
    pub kind: StorageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSpec>,

    /// User-provided credential secret for external storage kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobServiceSpec {
    #[serde(default)]
    pub worker_count: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartMuseumSpec {
    #[serde(default)]
    pub absolute_url: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClairSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerability_sources: Vec<String>,
}

impl RegistryCluster {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// a new owner reference for the cluster; child resources and generated
    /// secrets hang off this so platform garbage collection cascades.
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    pub fn labels_for(&self, component: &str) -> std::collections::BTreeMap<String, String> {
        [
            ("app.kubernetes.io/name".to_owned(), component.to_owned()),
            ("app.kubernetes.io/instance".to_owned(), self.name()),
            (
                "app.kubernetes.io/managed-by".to_owned(),
                "registry-cluster-operator".to_owned(),
            ),
            (
                "app.kubernetes.io/part-of".to_owned(),
                "registry-cluster".to_owned(),
            ),
        ]
        .into_iter()
        .collect()
    }
}
