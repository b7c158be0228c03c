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

//! Cache tier lifecycle. In-cluster mode delegates pod management to the
//! failover operator through a `RedisFailover` CR and only resizes it when
//! doing so cannot take down the master. External mode validates the
//! user-provided endpoint and hands it straight to the consumers.

pub mod downscale;
pub mod redis;

use crate::context::Context;
use crate::reconcile::cache::downscale::DownscaleDecision;
use crate::reconcile::cache::redis::{RedisAdmin, RedisConnect};
use crate::reconcile::diff;
use crate::reconcile::lcm::{CRStatus, LifecycleController, Phase};
use crate::reconcile::{Error, generated_password};
use crate::types::v1alpha1::component::Component;
use crate::types::v1alpha1::condition::ConditionStatus;
use crate::types::v1alpha1::redis_failover::{
    AuthSettings, RedisFailover, RedisFailoverSpec, RedisSettings, SentinelSettings,
};
use crate::types::v1alpha1::registry_cluster::{CacheSpec, RegistryCluster, TierKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{info, warn};

pub const SERVER_PORT: &str = "6379";
pub const SENTINEL_PORT: &str = "26379";
pub const SENTINEL_GROUP: &str = "mymaster";

/// Pod-name prefixes used by the failover operator's workloads.
pub const SERVER_PREFIX: &str = "rfr";
pub const SENTINEL_PREFIX: &str = "rfs";

/// Application components that consume the cache connection.
pub const CONSUMERS: &[&str] = &["chartmuseum", "clair", "jobservice", "registry"];

/// Default sentinel quorum size for in-cluster deployments.
const SENTINEL_REPLICAS: i32 = 3;

/// Stable condition reasons, also used as event reasons.
pub mod reason {
    pub const PROVISIONING: &str = "CacheProvisioning";
    pub const CREATE_SECRET_FAILED: &str = "CreateCacheSecretFailed";
    pub const CREATE_CR_FAILED: &str = "CreateCacheCRFailed";
    pub const GET_CR_FAILED: &str = "GetCacheCRFailed";
    pub const GET_SECRET_FAILED: &str = "GetCacheSecretFailed";
    pub const INVALID_EXTERNAL_SPEC: &str = "InvalidExternalCacheSpec";
    pub const GET_PODS_FAILED: &str = "GetCachePodsFailed";
    pub const PODS_PENDING: &str = "CachePodsPending";
    pub const SENTINEL_UNAVAILABLE: &str = "SentinelUnavailable";
    pub const PING_FAILED: &str = "CachePingFailed";
    pub const DUAL_MASTER: &str = "DualMasterDetected";
    pub const FAILOVER_TRIGGERED: &str = "FailoverTriggered";
    pub const PODS_CONVERGING: &str = "CachePodsConverging";
    pub const SCALING: &str = "CacheScaling";
    pub const UPDATING: &str = "CacheUpdating";
    pub const READY: &str = "CacheReady";
}

pub struct CacheLifecycle<'a> {
    cluster: &'a RegistryCluster,
    ctx: &'a Context,
    admin: &'a dyn RedisAdmin,
    name: String,
    namespace: String,
    expected: Option<RedisFailover>,
    actual: Option<RedisFailover>,
    connect: Option<RedisConnect>,
    status: CRStatus,
}

impl<'a> CacheLifecycle<'a> {
    pub fn new(
        cluster: &'a RegistryCluster,
        ctx: &'a Context,
        admin: &'a dyn RedisAdmin,
    ) -> Result<Self, Error> {
        Ok(Self {
            cluster,
            ctx,
            admin,
            name: cluster.name(),
            namespace: cluster.namespace()?,
            expected: None,
            actual: None,
            connect: None,
            status: CRStatus::for_component(Component::Cache),
        })
    }

    fn spec(&self) -> &CacheSpec {
        &self.cluster.spec.cache
    }

    fn is_external(&self) -> bool {
        self.spec().kind == TierKind::External
    }

    fn auth_secret_name(&self) -> String {
        format!("{}-redis", self.name)
    }

    fn server_workload(&self) -> String {
        format!("{SERVER_PREFIX}-{}", self.name)
    }

    fn sentinel_workload(&self) -> String {
        format!("{SENTINEL_PREFIX}-{}", self.name)
    }

    /// Record the failure on the tier condition before handing the error up.
    fn fail(&mut self, reason: &str, err: Error) -> Error {
        self.status.record_failure(reason, &err);
        err
    }

    fn generate_expected(&self) -> Result<RedisFailover, Error> {
        let server = self.spec().server.as_ref().ok_or_else(|| Error::Config {
            message: "in-cluster cache requires a server spec".to_owned(),
        })?;

        Ok(RedisFailover {
            metadata: metav1::ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.cluster.labels_for("cache")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            spec: RedisFailoverSpec {
                redis: RedisSettings {
                    replicas: server.replicas,
                    resources: server.resources.clone(),
                },
                sentinel: SentinelSettings {
                    replicas: SENTINEL_REPLICAS,
                    resources: None,
                },
                auth: Some(AuthSettings {
                    secret_path: self.auth_secret_name(),
                }),
            },
        })
    }

    async fn in_cluster_connect(&mut self) -> Result<RedisConnect, Error> {
        let sentinel_workload = self.sentinel_workload();
        let server_workload = self.server_workload();

        let (_, sentinel_pods) = match self
            .ctx
            .deployment_pods(&sentinel_workload, &self.namespace)
            .await
        {
            Ok(found) => found,
            Err(err) => return Err(self.fail(reason::GET_PODS_FAILED, err.into())),
        };
        let (_, server_pods) = match self
            .ctx
            .statefulset_pods(&server_workload, &self.namespace)
            .await
        {
            Ok(found) => found,
            Err(err) => return Err(self.fail(reason::GET_PODS_FAILED, err.into())),
        };

        if server_pods.is_empty() {
            let err = Error::transient(reason::PODS_PENDING, "no cache server pods observed yet");
            return Err(self.fail(reason::PODS_PENDING, err));
        }

        let (_, current_sentinels) = downscale::partition_pods(&sentinel_pods);
        let endpoint = current_sentinels
            .iter()
            .find_map(|pod| pod.status.as_ref().and_then(|s| s.pod_ip.clone()));
        let Some(endpoint) = endpoint else {
            let err = Error::transient(
                reason::SENTINEL_UNAVAILABLE,
                "no sentinel pod with an address is available",
            );
            return Err(self.fail(reason::SENTINEL_UNAVAILABLE, err));
        };

        let password = match self
            .ctx
            .secret_value(&self.auth_secret_name(), &self.namespace, "password")
            .await
        {
            Ok(password) => password,
            Err(err) => return Err(self.fail(reason::GET_SECRET_FAILED, err.into())),
        };

        Ok(RedisConnect::in_cluster_sentinel(endpoint, Some(password)))
    }

    async fn external_connect(&mut self) -> Result<RedisConnect, Error> {
        let mut connect = match external_endpoint(self.spec()) {
            Ok(connect) => connect,
            Err(err) => return Err(self.fail(reason::INVALID_EXTERNAL_SPEC, err)),
        };

        if let Some(secret_name) = self.spec().secret_name.clone() {
            match self
                .ctx
                .secret_value(&secret_name, &self.namespace, "password")
                .await
            {
                Ok(password) => connect.password = Some(password),
                Err(err) => return Err(self.fail(reason::GET_SECRET_FAILED, err.into())),
            }
        }

        Ok(connect)
    }

    /// One secret per consumer component carrying the connection URL, plus
    /// the matching property the application tier reads.
    async fn expose_consumers(&mut self, connect: &RedisConnect) -> Result<(), Error> {
        let url = connect.url();
        for component in CONSUMERS {
            let (property, secret_name) = consumer_names(component);
            let secret = connection_secret(self.cluster, &secret_name, &url);

            if let Err(err) = self.ctx.ensure_secret(&secret, &self.namespace).await {
                return Err(self.fail(reason::CREATE_SECRET_FAILED, err.into()));
            }
            self.status.properties.set(property, secret_name);
        }
        Ok(())
    }
}

/// Property name and secret name advertised for one consumer component.
fn consumer_names(component: &str) -> (String, String) {
    (format!("{component}Secret"), format!("{component}-redis"))
}

/// Validate an external cache spec and derive the endpoint coordinates.
/// The password is resolved separately, out of the user-named secret.
fn external_endpoint(spec: &CacheSpec) -> Result<RedisConnect, Error> {
    let schema = spec.schema.as_deref().unwrap_or("redis");
    match schema {
        "sentinel" => {
            let host = spec.hosts.first().ok_or_else(|| Error::Config {
                message: "external sentinel cache requires at least one host".to_owned(),
            })?;
            let group_name = spec.group_name.clone().ok_or_else(|| Error::Config {
                message: "external sentinel cache requires a group name".to_owned(),
            })?;

            Ok(RedisConnect {
                endpoint: host.host.clone(),
                port: host.port.clone(),
                password: None,
                group_name: Some(group_name),
                schema: "sentinel".to_owned(),
            })
        }
        "redis" => {
            if spec.hosts.len() != 1 {
                return Err(Error::Config {
                    message: format!(
                        "external cache in redis schema requires exactly one host, got {}",
                        spec.hosts.len()
                    ),
                });
            }

            Ok(RedisConnect {
                endpoint: spec.hosts[0].host.clone(),
                port: spec.hosts[0].port.clone(),
                password: None,
                group_name: None,
                schema: "redis".to_owned(),
            })
        }
        other => Err(Error::Config {
            message: format!("unknown external cache schema '{other}'"),
        }),
    }
}

fn connection_secret(cluster: &RegistryCluster, name: &str, url: &str) -> corev1::Secret {
    corev1::Secret {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_owned()),
            namespace: cluster.meta().namespace.clone(),
            labels: Some(cluster.labels_for("cache")),
            owner_references: Some(vec![cluster.new_owner_ref()]),
            ..Default::default()
        },
        string_data: Some([("url".to_owned(), url.to_owned())].into_iter().collect()),
        ..Default::default()
    }
}

#[async_trait]
impl LifecycleController for CacheLifecycle<'_> {
    fn component(&self) -> Component {
        Component::Cache
    }

    fn status(&self) -> CRStatus {
        self.status.clone()
    }

    async fn observe(&mut self) -> Result<bool, Error> {
        if self.is_external() {
            return Ok(true);
        }

        self.expected = Some(self.generate_expected()?);
        match self.ctx.get::<RedisFailover>(&self.name, &self.namespace).await {
            Ok(actual) => {
                self.actual = Some(actual);
                Ok(true)
            }
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(self.fail(reason::GET_CR_FAILED, err.into())),
        }
    }

    async fn provision(&mut self) -> Result<(), Error> {
        let auth_secret = corev1::Secret {
            metadata: metav1::ObjectMeta {
                name: Some(self.auth_secret_name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.cluster.labels_for("cache")),
                owner_references: Some(vec![self.cluster.new_owner_ref()]),
                ..Default::default()
            },
            string_data: Some(
                [("password".to_owned(), generated_password())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        if let Err(err) = self.ctx.ensure_secret(&auth_secret, &self.namespace).await {
            return Err(self.fail(reason::CREATE_SECRET_FAILED, err.into()));
        }

        let expected = self.generate_expected()?;
        if let Err(err) = self.ctx.create(&expected, &self.namespace).await {
            return Err(self.fail(reason::CREATE_CR_FAILED, err.into()));
        }

        info!(cluster = %self.name, "cache failover cluster created");
        self.status = CRStatus::for_component(Component::Cache)
            .with_reason(reason::PROVISIONING)
            .with_message("cache cluster is being provisioned")
            .with_phase(Phase::Deploying);
        Ok(())
    }

    async fn readiness(&mut self) -> Result<(), Error> {
        let connect = if self.is_external() {
            self.external_connect().await?
        } else {
            self.in_cluster_connect().await?
        };

        if let Err(err) = self.admin.ping(&connect).await {
            let err = Error::transient(reason::PING_FAILED, err.to_string());
            return Err(self.fail(reason::PING_FAILED, err));
        }

        self.expose_consumers(&connect).await?;
        self.connect = Some(connect);

        self.status.condition.status = ConditionStatus::True;
        self.status.condition.reason = Some(reason::READY.to_owned());
        self.status.condition.message = Some("cache service is ready".to_owned());
        self.status.phase = Phase::Ready;
        Ok(())
    }

    async fn scale_up(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (&self.expected, &self.actual) else {
            return Ok(());
        };
        if expected.spec.redis.replicas <= actual.spec.redis.replicas {
            return Ok(());
        }

        self.ctx
            .record(
                self.cluster,
                EventType::Normal,
                reason::SCALING,
                &format!(
                    "scaling cache servers from {} to {}",
                    actual.spec.redis.replicas, expected.spec.redis.replicas
                ),
            )
            .await?;

        let mut desired = expected.clone();
        diff::inherit_resource_version(&mut desired, actual);
        self.ctx.replace(&desired, &self.namespace).await?;

        self.status.phase = Phase::Upgrading;
        self.status.condition.status = ConditionStatus::Unknown;
        self.status.condition.reason = Some(reason::SCALING.to_owned());
        self.status.condition.message = Some("cache cluster is scaling up".to_owned());
        Ok(())
    }

    async fn scale_down(&mut self) -> Result<(), Error> {
        let (Some(expected), Some(actual)) = (self.expected.clone(), self.actual.clone()) else {
            return Ok(());
        };
        let Some(leaving) = downscale::leaving_node_names(&expected, &actual) else {
            return Ok(());
        };

        let (_, server_pods) = match self
            .ctx
            .statefulset_pods(&self.server_workload(), &self.namespace)
            .await
        {
            Ok(found) => found,
            Err(err) => return Err(self.fail(reason::GET_PODS_FAILED, err.into())),
        };

        let password = self
            .connect
            .as_ref()
            .and_then(|c| c.password.clone());

        // Only pods that are not already terminating can hold a meaningful
        // role.
        let (_, current) = downscale::partition_pods(&server_pods);
        let masters =
            downscale::observe_masters(self.admin, &current, password.as_deref()).await?;

        match downscale::evaluate(&leaving, &masters) {
            DownscaleDecision::SplitBrain => {
                self.ctx
                    .record(
                        self.cluster,
                        EventType::Warning,
                        reason::DUAL_MASTER,
                        &format!("multiple cache masters observed: {masters:?}"),
                    )
                    .await?;

                self.status.phase = Phase::Failed;
                let err = Error::fatal(
                    reason::DUAL_MASTER,
                    format!("multiple cache masters observed: {masters:?}"),
                );
                Err(self.fail(reason::DUAL_MASTER, err))
            }
            DownscaleDecision::FailoverRequired => {
                let endpoint = self
                    .connect
                    .as_ref()
                    .map(|c| c.endpoint.clone())
                    .unwrap_or_default();

                self.ctx
                    .record(
                        self.cluster,
                        EventType::Normal,
                        reason::FAILOVER_TRIGGERED,
                        "master is on a leaving node, triggering sentinel failover",
                    )
                    .await?;
                if let Err(err) = self.admin.force_failover(&endpoint).await {
                    warn!(%endpoint, error = %err, "sentinel failover request failed");
                }

                // The resize itself waits for the next cycle so the role
                // change can settle.
                let err = Error::transient(
                    reason::FAILOVER_TRIGGERED,
                    "waiting for the master role to move off the leaving nodes",
                );
                Err(self.fail(reason::FAILOVER_TRIGGERED, err))
            }
            DownscaleDecision::Safe => {
                self.ctx
                    .record(
                        self.cluster,
                        EventType::Normal,
                        reason::SCALING,
                        &format!(
                            "scaling cache servers from {} to {}",
                            actual.spec.redis.replicas, expected.spec.redis.replicas
                        ),
                    )
                    .await?;

                let mut desired = expected;
                diff::inherit_resource_version(&mut desired, &actual);
                self.ctx.replace(&desired, &self.namespace).await?;

                self.status.phase = Phase::Upgrading;
                self.status.condition.status = ConditionStatus::Unknown;
                self.status.condition.reason = Some(reason::SCALING.to_owned());
                self.status.condition.message =
                    Some("cache cluster is scaling down".to_owned());
                Ok(())
            }
        }
    }

    /// Explicit teardown; generated secrets go with the owner cascade.
    async fn delete(&mut self) -> Result<(), Error> {
        if self.is_external() {
            return Ok(());
        }

        match self
            .ctx
            .delete::<RedisFailover>(&self.name, &self.namespace)
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

        let (_, server_pods) = match self
            .ctx
            .statefulset_pods(&self.server_workload(), &self.namespace)
            .await
        {
            Ok(found) => found,
            Err(err) => return Err(self.fail(reason::GET_PODS_FAILED, err.into())),
        };

        // Hold the update back until a previous resize has fully converged.
        if (server_pods.len() as i32) < actual.spec.redis.replicas {
            let err = Error::transient(
                reason::PODS_CONVERGING,
                "cache pods are still converging on the current replica count",
            );
            return Err(self.fail(reason::PODS_CONVERGING, err));
        }

        self.ctx
            .record(
                self.cluster,
                EventType::Normal,
                reason::UPDATING,
                "updating cache server resource requirements",
            )
            .await?;

        let mut desired = expected.clone();
        diff::inherit_resource_version(&mut desired, actual);
        self.ctx.replace(&desired, &self.namespace).await?;

        self.status.phase = Phase::Upgrading;
        self.status.condition.status = ConditionStatus::Unknown;
        self.status.condition.reason = Some(reason::UPDATING.to_owned());
        self.status.condition.message = Some("cache cluster is being updated".to_owned());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::registry_cluster::HostPort;

    fn external_spec(schema: &str, hosts: Vec<HostPort>, group: Option<&str>) -> CacheSpec {
        CacheSpec {
            kind: TierKind::External,
            schema: Some(schema.to_owned()),
            hosts,
            group_name: group.map(str::to_owned),
            ..Default::default()
        }
    }

    fn host(host: &str, port: &str) -> HostPort {
        HostPort {
            host: host.to_owned(),
            port: port.to_owned(),
        }
    }

    #[test]
    fn sentinel_schema_requires_hosts_and_a_group() {
        let spec = external_spec("sentinel", vec![], Some("mymaster"));
        assert!(matches!(
            external_endpoint(&spec),
            Err(Error::Config { .. })
        ));

        let spec = external_spec("sentinel", vec![host("s1", "26379")], None);
        assert!(matches!(
            external_endpoint(&spec),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn redis_schema_requires_exactly_one_host() {
        let spec = external_spec("redis", vec![host("a", "6379"), host("b", "6379")], None);
        assert!(matches!(
            external_endpoint(&spec),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn a_valid_sentinel_spec_resolves_to_its_first_host() {
        let spec = external_spec(
            "sentinel",
            vec![host("s1.example.com", "26379"), host("s2.example.com", "26379")],
            Some("mymaster"),
        );
        let connect = external_endpoint(&spec).unwrap();
        assert_eq!(connect.endpoint, "s1.example.com");
        assert_eq!(connect.url(), "redis+sentinel://s1.example.com:26379/mymaster");
    }

    #[test]
    fn the_registry_consumer_gets_the_conventional_secret_name() {
        let (property, secret) = consumer_names("registry");
        assert_eq!(property, "registrySecret");
        assert_eq!(secret, "registry-redis");
    }

    #[test]
    fn unknown_schemas_are_rejected() {
        let spec = external_spec("memcached", vec![host("a", "11211")], None);
        assert!(matches!(
            external_endpoint(&spec),
            Err(Error::Config { .. })
        ));
    }
}
