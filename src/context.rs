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
use crate::types::v1alpha1::condition::Condition;
use crate::types::v1alpha1::registry_cluster::RegistryCluster;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{DeleteParams, ListParams, ObjectList, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, ResourceExt, api::Api};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::info;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("secret '{}' not found", name))]
    SecretNotFound { name: String },

    #[snafu(display("secret '{}' missing required key '{}'", secret_name, key))]
    SecretMissingKey { secret_name: String, key: String },

    #[snafu(display("secret '{}' has invalid data encoding for key '{}'", secret_name, key))]
    SecretInvalidEncoding { secret_name: String, key: String },

    #[snafu(display("workload '{}' has no pod selector", name))]
    NoPodSelector { name: String },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }
}

pub struct Context {
    pub(crate) client: kube::Client,
    pub(crate) recorder: Recorder,
}

impl Context {
    pub fn new(client: kube::Client) -> Self {
        let reporter = Reporter {
            controller: "registry-cluster-operator".into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    /// send event
    #[inline]
    pub async fn record(
        &self,
        resource: &RegistryCluster,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &resource.object_ref(&()),
            )
            .context(RecordSnafu)
            .await
    }

    /// Persist the aggregated tier conditions onto the cluster's status
    /// subresource, retrying once on conflict against the latest revision.
    pub async fn update_conditions(
        &self,
        resource: &RegistryCluster,
        conditions: &[Condition],
    ) -> Result<RegistryCluster, Error> {
        let api: Api<RegistryCluster> =
            Api::namespaced(self.client.clone(), &resource.namespace()?);
        let name = &resource.name();

        let update_func = async |cluster: &RegistryCluster| {
            let mut status = cluster.status.clone().unwrap_or_default();
            status.conditions = conditions.to_vec();
            let status_body = serde_json::to_vec(&serde_json::json!({ "status": status }))?;

            api.replace_status(name, &PostParams::default(), status_body)
                .context(KubeSnafu)
                .await
        };

        match update_func(resource).await {
            Ok(c) => return Ok(c),
            _ => {}
        }

        info!("status update failed due to conflict, retrieve the latest resource and retry.");

        let new_one = api.get(name).context(KubeSnafu).await?;
        update_func(&new_one).await
    }

    pub async fn delete<T>(&self, name: &str, namespace: &str) -> Result<(), Error>
    where
        T: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .context(KubeSnafu)
            .await?;
        Ok(())
    }

    pub async fn get<T>(&self, name: &str, namespace: &str) -> Result<T, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).context(KubeSnafu).await
    }

    pub async fn create<T>(&self, resource: &T, namespace: &str) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), resource)
            .context(KubeSnafu)
            .await
    }

    /// Full replace, used for child-resource updates that must carry the
    /// actual resource's version token (optimistic concurrency).
    pub async fn replace<T>(&self, resource: &T, namespace: &str) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.replace(&resource.name_any(), &PostParams::default(), resource)
            .context(KubeSnafu)
            .await
    }

    pub async fn list<T>(&self, namespace: &str, params: &ListParams) -> Result<ObjectList<T>, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.list(params).context(KubeSnafu).await
    }

    pub async fn apply<T>(&self, resource: &T, namespace: &str) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            &resource.name_any(),
            &PatchParams::apply("registry-cluster-operator"),
            &Patch::Apply(resource),
        )
        .context(KubeSnafu)
        .await
    }

    /// Create the secret unless one with its name already exists. Returns
    /// true when a new secret was created.
    pub async fn ensure_secret(
        &self,
        secret: &corev1::Secret,
        namespace: &str,
    ) -> Result<bool, Error> {
        match self.get::<corev1::Secret>(&secret.name_any(), namespace).await {
            Ok(_) => Ok(false),
            Err(err) if err.is_not_found() => {
                self.create(secret, namespace).await?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Read one key out of a secret as UTF-8, with structured errors for
    /// each failure mode.
    pub async fn secret_value(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Result<String, Error> {
        let secret: corev1::Secret = match self.get(name, namespace).await {
            Ok(s) => s,
            Err(err) if err.is_not_found() => {
                return SecretNotFoundSnafu { name }.fail();
            }
            Err(err) => return Err(err),
        };

        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .ok_or_else(|| Error::SecretMissingKey {
                secret_name: name.to_owned(),
                key: key.to_owned(),
            })?;

        String::from_utf8(bytes.0.clone()).map_err(|_| Error::SecretInvalidEncoding {
            secret_name: name.to_owned(),
            key: key.to_owned(),
        })
    }

    /// Fetch a statefulset and the live pods matched by its selector.
    pub async fn statefulset_pods(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<(appsv1::StatefulSet, Vec<corev1::Pod>), Error> {
        let sts: appsv1::StatefulSet = self.get(name, namespace).await?;
        let selector = sts
            .spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.clone());
        let pods = self.selected_pods(name, namespace, selector).await?;
        Ok((sts, pods))
    }

    /// Fetch a deployment and the live pods matched by its selector.
    pub async fn deployment_pods(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<(appsv1::Deployment, Vec<corev1::Pod>), Error> {
        let deploy: appsv1::Deployment = self.get(name, namespace).await?;
        let selector = deploy
            .spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.clone());
        let pods = self.selected_pods(name, namespace, selector).await?;
        Ok((deploy, pods))
    }

    async fn selected_pods(
        &self,
        name: &str,
        namespace: &str,
        match_labels: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<corev1::Pod>, Error> {
        let match_labels = match_labels.ok_or_else(|| Error::NoPodSelector {
            name: name.to_owned(),
        })?;

        let selector = match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        let params = ListParams::default().labels(&selector);
        let pods = self.list::<corev1::Pod>(namespace, &params).await?;
        Ok(pods.items)
    }
}
