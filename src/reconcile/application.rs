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

//! Application tier lifecycle. Translates the cluster spec plus the
//! dependency tiers' published properties into the `Registry` CR the
//! companion application operator deploys from. Only runs once all three
//! dependency tiers report ready.

use crate::context::Context;
use crate::reconcile::Error;
use crate::reconcile::image::ImageLocator;
use crate::reconcile::lcm::{CRStatus, LifecycleController, Phase};
use crate::types::v1alpha1::component::Component;
use crate::types::v1alpha1::condition::ConditionStatus;
use crate::types::v1alpha1::registry::{
    ChartMuseumComponent, ClairComponent, ComponentDeployment, CoreComponent,
    JobServiceComponent, PortalComponent, Registry, RegistryComponent, RegistryComponents,
    RegistrySpec,
};
use crate::types::v1alpha1::registry_cluster::RegistryCluster;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::runtime::events::EventType;
use std::collections::BTreeMap;
use tracing::info;

pub mod reason {
    pub const PROVISIONING: &str = "ApplicationProvisioning";
    pub const CONFIG_INVALID: &str = "ApplicationConfigInvalid";
    pub const CREATE_CR_FAILED: &str = "CreateApplicationCRFailed";
    pub const GET_CR_FAILED: &str = "GetApplicationCRFailed";
    pub const DEPENDENCY_MISSING: &str = "DependencyPropertyMissing";
    pub const NOT_READY: &str = "ApplicationNotReady";
    pub const SCALING: &str = "ApplicationScaling";
    pub const UPDATING: &str = "ApplicationUpdating";
    pub const READY: &str = "ServiceReady";
}

pub struct ApplicationLifecycle<'a> {
    cluster: &'a RegistryCluster,
    ctx: &'a Context,
    locator: ImageLocator,
    statuses: &'a BTreeMap<Component, CRStatus>,
    name: String,
    namespace: String,
    expected: Option<Registry>,
    actual: Option<Registry>,
    status: CRStatus,
}

impl<'a> ApplicationLifecycle<'a> {
    pub fn new(
        cluster: &'a RegistryCluster,
        ctx: &'a Context,
        statuses: &'a BTreeMap<Component, CRStatus>,
    ) -> Result<Self, Error> {
        Ok(Self {
            cluster,
            ctx,
            locator: ImageLocator::new(cluster)?,
            statuses,
            name: format!("{}-registry", cluster.name()),
            namespace: cluster.namespace()?,
            expected: None,
            actual: None,
            status: CRStatus::for_component(Component::Application),
        })
    }

    fn fail(&mut self, reason: &str, err: Error) -> Error {
        self.status.record_failure(reason, &err);
        err
    }

    /// Look up a property published by a dependency tier. A missing one is
    /// transient: the tier may simply not have republished yet.
    fn property(&self, component: Component, name: &str) -> Result<String, Error> {
        self.statuses
            .get(&component)
            .and_then(|status| status.properties.get(name))
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::transient(
                    reason::DEPENDENCY_MISSING,
                    format!("{component} tier has not published property '{name}' yet"),
                )
            })
    }

    fn generate_expected(&self) -> Result<Registry, Error> {
        let spec = &self.cluster.spec;
        let replicas = spec.replicas;
        let storage_property = spec.storage.kind.property_name();
        let storage_secret = self.property(Component::Storage, storage_property)?;

        let core = CoreComponent {
            deployment: ComponentDeployment {
                replicas,
                image: self.locator.core_image(),
            },
            database_secret: self.property(Component::Database, "coreSecret")?,
        };
        let portal = PortalComponent {
            deployment: ComponentDeployment {
                replicas,
                image: self.locator.portal_image(),
            },
        };
        let registry = RegistryComponent {
            deployment: ComponentDeployment {
                replicas,
                image: self.locator.registry_image(),
            },
            storage_secret: storage_secret.clone(),
            cache_secret: self.property(Component::Cache, "registrySecret")?,
        };

        let job_service = match &spec.job_service {
            Some(js) => Some(JobServiceComponent {
                deployment: ComponentDeployment {
                    replicas,
                    image: self.locator.jobservice_image(),
                },
                cache_secret: self.property(Component::Cache, "jobserviceSecret")?,
                worker_count: js.worker_count,
            }),
            None => None,
        };
        let chart_museum = match &spec.chart_museum {
            Some(_) => Some(ChartMuseumComponent {
                deployment: ComponentDeployment {
                    replicas,
                    image: self.locator.chartmuseum_image(),
                },
                storage_secret,
                cache_secret: self.property(Component::Cache, "chartmuseumSecret")?,
            }),
            None => None,
        };
        let clair = match &spec.clair {
            Some(clair) => Some(ClairComponent {
                deployment: ComponentDeployment {
                    replicas,
                    image: self.locator.clair_image(),
                },
                database_secret: self.property(Component::Database, "clairSecret")?,
                cache_secret: self.property(Component::Cache, "clairSecret")?,
                vulnerability_sources: clair.vulnerability_sources.clone(),
            }),
            None => None,
        };

        Ok(Registry {
            metadata: metav1::ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.cluster.labels_for("application")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            spec: RegistrySpec {
                version: self.locator.version().to_owned(),
                public_url: spec.public_url.clone(),
                admin_password_secret: spec.admin_password_secret.clone(),
                image_pull_secret: spec
                    .image_source
                    .as_ref()
                    .and_then(|source| source.image_pull_secret.clone()),
                components: RegistryComponents {
                    core,
                    portal,
                    registry,
                    job_service,
                    chart_museum,
                    clair,
                },
            },
            status: None,
        })
    }

    async fn apply_expected(&mut self, reason: &str, message: &str) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };

        self.ctx
            .record(self.cluster, EventType::Normal, reason, message)
            .await?;

        let mut desired = expected.clone();
        super::diff::inherit_resource_version(&mut desired, actual);
        self.ctx.replace(&desired, &self.namespace).await?;

        self.status.phase = Phase::Upgrading;
        self.status.condition.status = ConditionStatus::Unknown;
        self.status.condition.reason = Some(reason.to_owned());
        self.status.condition.message = Some(message.to_owned());
        Ok(())
    }
}

#[async_trait]
impl LifecycleController for ApplicationLifecycle<'_> {
    fn component(&self) -> Component {
        Component::Application
    }

    fn status(&self) -> CRStatus {
        self.status.clone()
    }

    async fn observe(&mut self) -> Result<bool, Error> {
        self.expected = Some(self.generate_expected()?);
        match self.ctx.get::<Registry>(&self.name, &self.namespace).await {
            Ok(actual) => {
                self.actual = Some(actual);
                Ok(true)
            }
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(self.fail(reason::GET_CR_FAILED, err.into())),
        }
    }

    async fn provision(&mut self) -> Result<(), Error> {
        let expected = match &self.expected {
            Some(expected) => expected.clone(),
            None => self.generate_expected()?,
        };
        if let Err(err) = self.ctx.create(&expected, &self.namespace).await {
            return Err(self.fail(reason::CREATE_CR_FAILED, err.into()));
        }

        info!(cluster = %self.cluster.name(), "application deployment created");
        self.status = CRStatus::for_component(Component::Application)
            .with_reason(reason::PROVISIONING)
            .with_message("application is being deployed")
            .with_phase(Phase::Deploying);
        Ok(())
    }

    async fn readiness(&mut self) -> Result<(), Error> {
        let Some(actual) = &self.actual else {
            return Ok(());
        };

        match actual.ready_status() {
            ConditionStatus::True => {
                self.status.condition.status = ConditionStatus::True;
                self.status.condition.reason = Some(reason::READY.to_owned());
                self.status.condition.message = Some("registry service is ready".to_owned());
                self.status.phase = Phase::Ready;
                Ok(())
            }
            ConditionStatus::False => {
                let message = actual
                    .ready_condition()
                    .and_then(|c| c.message.clone())
                    .unwrap_or_else(|| "application reports not ready".to_owned());
                let err = Error::transient(reason::NOT_READY, message);
                Err(self.fail(reason::NOT_READY, err))
            }
            ConditionStatus::Unknown => {
                let err = Error::transient(
                    reason::NOT_READY,
                    "application has not reported readiness yet",
                );
                Err(self.fail(reason::NOT_READY, err))
            }
        }
    }

    async fn scale_up(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        let (want, have) = (
            expected.spec.components.core.deployment.replicas,
            actual.spec.components.core.deployment.replicas,
        );
        if want <= have {
            return Ok(());
        }

        self.apply_expected(
            reason::SCALING,
            &format!("scaling application from {have} to {want} replicas"),
        )
        .await
    }

    async fn scale_down(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        let (want, have) = (
            expected.spec.components.core.deployment.replicas,
            actual.spec.components.core.deployment.replicas,
        );
        if want >= have {
            return Ok(());
        }

        self.apply_expected(
            reason::SCALING,
            &format!("scaling application from {have} to {want} replicas"),
        )
        .await
    }

    async fn delete(&mut self) -> Result<(), Error> {
        match self.ctx.delete::<Registry>(&self.name, &self.namespace).await {
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
        let unchanged = expected.spec.version == actual.spec.version
            && expected.spec.components == actual.spec.components
            && expected.spec.public_url == actual.spec.public_url;
        if unchanged {
            return Ok(());
        }

        self.apply_expected(reason::UPDATING, "updating application deployment")
            .await
    }
}
