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

//! Storage tier lifecycle. In-cluster mode manages a `MinIOInstance` CR and
//! exposes its credentials to the application; every external kind (`s3`,
//! `azure`, `gcs`, `swift`, `oss`) passes a user-provided credential secret
//! through under a kind-specific property name.

use crate::context::Context;
use crate::reconcile::Error;
use crate::reconcile::diff;
use crate::reconcile::lcm::{CRStatus, LifecycleController, Phase};
use crate::types::v1alpha1::component::Component;
use crate::types::v1alpha1::condition::ConditionStatus;
use crate::types::v1alpha1::minio::{MinIOInstance, MinIOInstanceSpec};
use crate::types::v1alpha1::registry_cluster::{RegistryCluster, StorageSpec};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::runtime::events::EventType;
use tracing::info;

/// Secret the registry component mounts for in-cluster object storage.
pub const REGISTRY_STORAGE_SECRET: &str = "registry-storage";

pub mod reason {
    pub const PROVISIONING: &str = "StorageProvisioning";
    pub const CREATE_SECRET_FAILED: &str = "CreateStorageSecretFailed";
    pub const CREATE_CR_FAILED: &str = "CreateStorageCRFailed";
    pub const GET_CR_FAILED: &str = "GetStorageCRFailed";
    pub const NOT_SERVING: &str = "StorageNotServing";
    pub const SECRET_MISSING: &str = "StorageSecretMissing";
    pub const SCALING: &str = "StorageScaling";
    pub const UPDATING: &str = "StorageUpdating";
    pub const READY: &str = "StorageReady";
}

pub struct StorageLifecycle<'a> {
    cluster: &'a RegistryCluster,
    ctx: &'a Context,
    name: String,
    namespace: String,
    expected: Option<MinIOInstance>,
    actual: Option<MinIOInstance>,
    status: CRStatus,
}

impl<'a> StorageLifecycle<'a> {
    pub fn new(cluster: &'a RegistryCluster, ctx: &'a Context) -> Result<Self, Error> {
        Ok(Self {
            cluster,
            ctx,
            name: cluster.name(),
            namespace: cluster.namespace()?,
            expected: None,
            actual: None,
            status: CRStatus::for_component(Component::Storage),
        })
    }

    fn spec(&self) -> &StorageSpec {
        &self.cluster.spec.storage
    }

    fn is_external(&self) -> bool {
        self.spec().kind.is_external()
    }

    fn creds_secret_name(&self) -> String {
        format!("{}-storage", self.name)
    }

    fn fail(&mut self, reason: &str, err: Error) -> Error {
        self.status.record_failure(reason, &err);
        err
    }

    fn generate_expected(&self) -> Result<MinIOInstance, Error> {
        let server = self.spec().server.as_ref().ok_or_else(|| Error::Config {
            message: "in-cluster storage requires a server spec".to_owned(),
        })?;

        Ok(MinIOInstance {
            metadata: metav1::ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.cluster.labels_for("storage")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            spec: MinIOInstanceSpec {
                replicas: server.replicas,
                resources: server.resources.clone(),
                creds_secret: Some(corev1::LocalObjectReference {
                    name: self.creds_secret_name(),
                }),
            },
            status: None,
        })
    }

    async fn expose_in_cluster(&mut self) -> Result<(), Error> {
        // The registry component gets its own copy pointing at the
        // instance credentials.
        let secret = corev1::Secret {
            metadata: metav1::ObjectMeta {
                name: Some(REGISTRY_STORAGE_SECRET.to_owned()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.cluster.labels_for("storage")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            string_data: Some(
                [("source".to_owned(), self.creds_secret_name())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        if let Err(err) = self.ctx.ensure_secret(&secret, &self.namespace).await {
            return Err(self.fail(reason::CREATE_SECRET_FAILED, err.into()));
        }

        self.status
            .properties
            .set(self.spec().kind.property_name(), REGISTRY_STORAGE_SECRET);
        Ok(())
    }

    async fn expose_external(&mut self) -> Result<(), Error> {
        let secret_name = self.spec().secret_name.clone().ok_or_else(|| Error::Config {
            message: format!(
                "external storage kind '{}' requires a credential secret name",
                self.spec().kind.property_name()
            ),
        })?;

        // Verify the referenced secret exists before advertising it.
        match self
            .ctx
            .get::<corev1::Secret>(&secret_name, &self.namespace)
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                let err = Error::transient(
                    reason::SECRET_MISSING,
                    format!("storage credential secret '{secret_name}' does not exist"),
                );
                return Err(self.fail(reason::SECRET_MISSING, err));
            }
            Err(err) => return Err(self.fail(reason::SECRET_MISSING, err.into())),
        }

        self.status
            .properties
            .set(self.spec().kind.property_name(), &secret_name);
        Ok(())
    }
}

#[async_trait]
impl LifecycleController for StorageLifecycle<'_> {
    fn component(&self) -> Component {
        Component::Storage
    }

    fn status(&self) -> CRStatus {
        self.status.clone()
    }

    async fn observe(&mut self) -> Result<bool, Error> {
        if self.is_external() {
            return Ok(true);
        }

        self.expected = Some(self.generate_expected()?);
        match self
            .ctx
            .get::<MinIOInstance>(&self.name, &self.namespace)
            .await
        {
            Ok(actual) => {
                self.actual = Some(actual);
                Ok(true)
            }
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(self.fail(reason::GET_CR_FAILED, err.into())),
        }
    }

    async fn provision(&mut self) -> Result<(), Error> {
        let creds = corev1::Secret {
            metadata: metav1::ObjectMeta {
                name: Some(self.creds_secret_name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.cluster.labels_for("storage")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            string_data: Some(
                [
                    ("accesskey".to_owned(), super::generated_password()),
                    ("secretkey".to_owned(), super::generated_password()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        };
        if let Err(err) = self.ctx.ensure_secret(&creds, &self.namespace).await {
            return Err(self.fail(reason::CREATE_SECRET_FAILED, err.into()));
        }

        let expected = self.generate_expected()?;
        if let Err(err) = self.ctx.create(&expected, &self.namespace).await {
            return Err(self.fail(reason::CREATE_CR_FAILED, err.into()));
        }

        info!(cluster = %self.name, "object storage instance created");
        self.status = CRStatus::for_component(Component::Storage)
            .with_reason(reason::PROVISIONING)
            .with_message("object storage is being provisioned")
            .with_phase(Phase::Deploying);
        Ok(())
    }

    async fn readiness(&mut self) -> Result<(), Error> {
        if self.is_external() {
            self.expose_external().await?;
        } else {
            let serving = self.actual.as_ref().is_some_and(MinIOInstance::is_serving);
            if !serving {
                let err = Error::transient(
                    reason::NOT_SERVING,
                    "object storage has not reached its declared replica count",
                );
                return Err(self.fail(reason::NOT_SERVING, err));
            }
            self.expose_in_cluster().await?;
        }

        self.status.condition.status = ConditionStatus::True;
        self.status.condition.reason = Some(reason::READY.to_owned());
        self.status.condition.message = Some("storage service is ready".to_owned());
        self.status.phase = Phase::Ready;
        Ok(())
    }

    async fn scale_up(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        if expected.spec.replicas <= actual.spec.replicas {
            return Ok(());
        }

        self.resize().await
    }

    // Erasure-coded sets rebalance on their own; shrinking is applied
    // directly.
    async fn scale_down(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        if expected.spec.replicas >= actual.spec.replicas {
            return Ok(());
        }

        self.resize().await
    }

    async fn delete(&mut self) -> Result<(), Error> {
        if self.is_external() {
            return Ok(());
        }

        match self
            .ctx
            .delete::<MinIOInstance>(&self.name, &self.namespace)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        self.status.phase = Phase::Destroying;
        Ok(())
    }

    async fn rolling_upgrade(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        if !diff::resources_differ(expected, actual) {
            return Ok(());
        }

        self.ctx
            .record(
                self.cluster,
                EventType::Normal,
                reason::UPDATING,
                "updating object storage resource requirements",
            )
            .await?;

        let mut desired = expected.clone();
        diff::inherit_resource_version(&mut desired, actual);
        self.ctx.replace(&desired, &self.namespace).await?;

        self.status.phase = Phase::Upgrading;
        self.status.condition.status = ConditionStatus::Unknown;
        self.status.condition.reason = Some(reason::UPDATING.to_owned());
        self.status.condition.message = Some("object storage is being updated".to_owned());
        Ok(())
    }
}

impl StorageLifecycle<'_> {
    async fn resize(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };

        self.ctx
            .record(
                self.cluster,
                EventType::Normal,
                reason::SCALING,
                &format!(
                    "scaling object storage from {} to {} replicas",
                    actual.spec.replicas, expected.spec.replicas
                ),
            )
            .await?;

        let mut desired = expected.clone();
        diff::inherit_resource_version(&mut desired, actual);
        self.ctx.replace(&desired, &self.namespace).await?;

        self.status.phase = Phase::Upgrading;
        self.status.condition.status = ConditionStatus::Unknown;
        self.status.condition.reason = Some(reason::SCALING.to_owned());
        self.status.condition.message = Some("object storage is resizing".to_owned());
        Ok(())
    }
}
