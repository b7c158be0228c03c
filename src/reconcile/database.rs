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

//! Database tier lifecycle. In-cluster mode manages a `Postgresql` CR and
//! gates on the database operator reporting the cluster Running; external
//! mode passes through a user-provided connection secret. No master-safety
//! concern here, the database operator handles its own failover ordering.

use crate::context::Context;
use crate::reconcile::Error;
use crate::reconcile::diff;
use crate::reconcile::lcm::{CRStatus, LifecycleController, Phase};
use crate::types::v1alpha1::component::Component;
use crate::types::v1alpha1::condition::ConditionStatus;
use crate::types::v1alpha1::postgresql::{Postgresql, PostgresqlSpec, Volume};
use crate::types::v1alpha1::registry_cluster::{DatabaseSpec, RegistryCluster, TierKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::Resource;
use kube::runtime::events::EventType;
use tracing::info;

/// Application components that consume a database connection.
pub const CONSUMERS: &[&str] = &["core", "clair", "notary-server", "notary-signer"];

const DEFAULT_VOLUME_SIZE: &str = "1Gi";

pub mod reason {
    pub const PROVISIONING: &str = "DatabaseProvisioning";
    pub const CREATE_SECRET_FAILED: &str = "CreateDatabaseSecretFailed";
    pub const CREATE_CR_FAILED: &str = "CreateDatabaseCRFailed";
    pub const GET_CR_FAILED: &str = "GetDatabaseCRFailed";
    pub const GET_SECRET_FAILED: &str = "GetDatabaseSecretFailed";
    pub const NOT_RUNNING: &str = "DatabaseNotRunning";
    pub const SCALING: &str = "DatabaseScaling";
    pub const UPDATING: &str = "DatabaseUpdating";
    pub const READY: &str = "DatabaseReady";
}

pub struct DatabaseLifecycle<'a> {
    cluster: &'a RegistryCluster,
    ctx: &'a Context,
    name: String,
    namespace: String,
    expected: Option<Postgresql>,
    actual: Option<Postgresql>,
    status: CRStatus,
}

impl<'a> DatabaseLifecycle<'a> {
    pub fn new(cluster: &'a RegistryCluster, ctx: &'a Context) -> Result<Self, Error> {
        Ok(Self {
            cluster,
            ctx,
            name: cluster.name(),
            namespace: cluster.namespace()?,
            expected: None,
            actual: None,
            status: CRStatus::for_component(Component::Database),
        })
    }

    fn spec(&self) -> &DatabaseSpec {
        &self.cluster.spec.database
    }

    fn is_external(&self) -> bool {
        self.spec().kind == TierKind::External
    }

    fn creds_secret_name(&self) -> String {
        format!("{}-database", self.name)
    }

    fn fail(&mut self, reason: &str, err: Error) -> Error {
        self.status.record_failure(reason, &err);
        err
    }

    fn generate_expected(&self) -> Result<Postgresql, Error> {
        let server = self.spec().server.as_ref().ok_or_else(|| Error::Config {
            message: "in-cluster database requires a server spec".to_owned(),
        })?;

        Ok(Postgresql {
            metadata: metav1::ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.cluster.labels_for("database")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            spec: PostgresqlSpec {
                number_of_instances: server.replicas,
                resources: server.resources.clone(),
                volume: Some(Volume {
                    size: server
                        .storage_size
                        .clone()
                        .unwrap_or_else(|| DEFAULT_VOLUME_SIZE.to_owned()),
                }),
            },
            status: None,
        })
    }

    /// The name of the connection secret each consumer gets pointed at. For
    /// in-cluster databases this operator creates it; for external ones the
    /// user already did.
    async fn source_secret(&mut self) -> Result<String, Error> {
        if self.is_external() {
            let name = self.spec().secret_name.clone().ok_or_else(|| Error::Config {
                message: "external database requires a connection secret name".to_owned(),
            })?;
            // Surface a typo in the referenced name now rather than at
            // application startup.
            if let Err(err) = self
                .ctx
                .secret_value(&name, &self.namespace, "password")
                .await
            {
                return Err(self.fail(reason::GET_SECRET_FAILED, err.into()));
            }
            Ok(name)
        } else {
            Ok(self.creds_secret_name())
        }
    }

    async fn expose_consumers(&mut self, source_secret: &str) -> Result<(), Error> {
        for component in CONSUMERS {
            let secret_name = format!("{component}-database");
            let secret = consumer_secret(self.cluster, &secret_name, source_secret);

            if let Err(err) = self.ctx.ensure_secret(&secret, &self.namespace).await {
                return Err(self.fail(reason::CREATE_SECRET_FAILED, err.into()));
            }
            self.status
                .properties
                .set(&format!("{component}Secret"), &secret_name);
        }
        Ok(())
    }
}

/// Consumer-facing connection secret. Carries a pointer back to the source
/// credential secret; the application operator resolves the actual values.
fn consumer_secret(
    cluster: &RegistryCluster,
    name: &str,
    source_secret: &str,
) -> corev1::Secret {
    corev1::Secret {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_owned()),
            namespace: cluster.meta().namespace.clone(),
            labels: Some(cluster.labels_for("database")),
            owner_references: Some(vec![cluster.new_owner_ref()]),
            ..Default::default()
        },
        string_data: Some(
            [("source".to_owned(), source_secret.to_owned())]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    }
}

#[async_trait]
impl LifecycleController for DatabaseLifecycle<'_> {
    fn component(&self) -> Component {
        Component::Database
    }

    fn status(&self) -> CRStatus {
        self.status.clone()
    }

    async fn observe(&mut self) -> Result<bool, Error> {
        if self.is_external() {
            return Ok(true);
        }

        self.expected = Some(self.generate_expected()?);
        match self.ctx.get::<Postgresql>(&self.name, &self.namespace).await {
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
                labels: Some(self.cluster.labels_for("database")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            string_data: Some(
                [
                    ("username".to_owned(), "registry".to_owned()),
                    ("password".to_owned(), super::generated_password()),
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

        info!(cluster = %self.name, "database cluster created");
        self.status = CRStatus::for_component(Component::Database)
            .with_reason(reason::PROVISIONING)
            .with_message("database cluster is being provisioned")
            .with_phase(Phase::Deploying);
        Ok(())
    }

    async fn readiness(&mut self) -> Result<(), Error> {
        if !self.is_external() {
            let running = self.actual.as_ref().is_some_and(Postgresql::is_running);
            if !running {
                let err = Error::transient(
                    reason::NOT_RUNNING,
                    "database cluster has not reported Running yet",
                );
                return Err(self.fail(reason::NOT_RUNNING, err));
            }
        }

        let source = self.source_secret().await?;
        self.expose_consumers(&source).await?;

        self.status.condition.status = ConditionStatus::True;
        self.status.condition.reason = Some(reason::READY.to_owned());
        self.status.condition.message = Some("database service is ready".to_owned());
        self.status.phase = Phase::Ready;
        Ok(())
    }

    async fn scale_up(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        if expected.spec.number_of_instances <= actual.spec.number_of_instances {
            return Ok(());
        }

        self.resize().await
    }

    // The database operator drains replicas itself, so shrinking is applied
    // directly.
    async fn scale_down(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        if expected.spec.number_of_instances >= actual.spec.number_of_instances {
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
            .delete::<Postgresql>(&self.name, &self.namespace)
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
                "updating database resource requirements",
            )
            .await?;

        let mut desired = expected.clone();
        diff::inherit_resource_version(&mut desired, actual);
        self.ctx.replace(&desired, &self.namespace).await?;

        self.status.phase = Phase::Upgrading;
        self.status.condition.status = ConditionStatus::Unknown;
        self.status.condition.reason = Some(reason::UPDATING.to_owned());
        self.status.condition.message = Some("database cluster is being updated".to_owned());
        Ok(())
    }
}

impl DatabaseLifecycle<'_> {
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
                    "scaling database instances from {} to {}",
                    actual.spec.number_of_instances, expected.spec.number_of_instances
                ),
            )
            .await?;

        let mut desired = expected.clone();
        diff::inherit_resource_version(&mut desired, actual);
        self.ctx.replace(&desired, &self.namespace).await?;

        self.status.phase = Phase::Upgrading;
        self.status.condition.status = ConditionStatus::Unknown;
        self.status.condition.reason = Some(reason::SCALING.to_owned());
        self.status.condition.message = Some("database cluster is resizing".to_owned());
        Ok(())
    }
}
